pub mod builder;
pub mod params;

pub use builder::{
    count, delete, insert, select_by_id, select_list, update, QueryBuf,
};
pub use params::PgBindValue;
