//! REST scaffolding over PostgreSQL: register resource descriptors and get
//! CRUD endpoints with filtering, sorting, pagination, preloading, and
//! field projection, plus store-backed text templating and a whole-store
//! design snapshot.

pub mod builtin;
pub mod design;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod projection;
pub mod query;
pub mod resource;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod template;

pub use design::{AccessorRegistry, DesignAccessor, ResourceAccessor};
pub use error::AppError;
pub use resource::{
    ColumnDef, FieldKind, FilterPolicy, Operation, Relation, RelationKind, Resource,
    ResourceRegistry,
};
pub use routes::router;
pub use state::AppState;
