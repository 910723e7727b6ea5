//! HTTP API for the creator console
//!
//! Content management for the bot, scripts and subscribers, plus the
//! conversation actions that go through the runtime.

mod handlers;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::chat_backend::{ChatBackend, LoggingBackend};
use crate::db::Database;
use crate::runtime::{DatabaseStorage, ProductionRuntime, RuntimeManager};
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub runtime: Arc<ProductionRuntime>,
}

impl AppState {
    pub fn new(db: Database, backend: Arc<dyn ChatBackend>, history_limit: usize) -> Self {
        let runtime = RuntimeManager::new(
            DatabaseStorage::new(db.clone()),
            LoggingBackend::new(backend),
            history_limit,
        );
        Self {
            db,
            runtime: Arc::new(runtime),
        }
    }
}
