pub mod crud;

pub use crud::{parse_id, CrudService};
