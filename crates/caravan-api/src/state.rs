//! Shared application state.

use std::sync::Arc;

use caravan_engine::registry::ManagerRegistry;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry of live game managers.
    pub registry: Arc<ManagerRegistry>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(registry: Arc<ManagerRegistry>) -> Self {
        Self { registry }
    }
}
