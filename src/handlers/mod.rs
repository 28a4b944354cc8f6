pub mod common;
pub mod design;
pub mod generation;
pub mod output;
pub mod resource;
