use std::sync::Arc;

use crate::chat::store::ChatStore;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable chat store. Default: PgChatStore; tests swap in an in-memory one.
    pub store: Arc<dyn ChatStore>,
    pub config: Config,
}
