//! Shared handler state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use vigil_engine::LifecycleManager;
use vigil_store::Store;

pub struct AppState {
    pub store: Store,
    pub lifecycle: Arc<LifecycleManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Store, lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            store,
            lifecycle,
            started_at: Utc::now(),
        }
    }
}
