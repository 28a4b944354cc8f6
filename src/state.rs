//! Shared application state for all routes.

use crate::design::AccessorRegistry;
use crate::resource::ResourceRegistry;
use crate::template::FunctionRegistry;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Resources in registration order; fixed for the process lifetime.
    pub registry: Arc<ResourceRegistry>,
    pub functions: Arc<FunctionRegistry>,
    pub accessors: Arc<AccessorRegistry>,
}

impl AppState {
    /// State with a generic design accessor per registered resource.
    pub fn new(pool: PgPool, registry: ResourceRegistry, functions: FunctionRegistry) -> Self {
        let registry = Arc::new(registry);
        let accessors = Arc::new(AccessorRegistry::generic(&registry));
        AppState {
            pool,
            registry,
            functions: Arc::new(functions),
            accessors,
        }
    }

    pub fn with_accessors(mut self, accessors: AccessorRegistry) -> Self {
        self.accessors = Arc::new(accessors);
        self
    }
}
