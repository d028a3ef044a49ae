//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use listing_core::{BulkTaskManager, TaskStore};

use crate::config::Config;
use crate::entities::AnyStore;

#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Listing persistence.
    pub store: Arc<AnyStore>,
    /// In-memory bulk-create task registry and its workers.
    pub bulk: BulkTaskManager<AnyStore>,
}

impl AppState {
    pub fn new(config: Config, store: AnyStore) -> Self {
        let store = Arc::new(store);
        let bulk = BulkTaskManager::new(TaskStore::default(), Arc::clone(&store));
        Self { config: Arc::new(config), store, bulk }
    }
}
