use std::sync::Arc;

use crate::config::Config;
use crate::db::DbPool;
use crate::services::storage::Storage;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: DbPool,
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
}

impl AppState {
    pub fn new(store: DbPool, config: Config) -> Self {
        let storage = Arc::new(Storage::new(config.storage_root.clone(), config.max_upload_bytes));
        Self {
            store,
            config: Arc::new(config),
            storage,
        }
    }
}
