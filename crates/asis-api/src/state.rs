//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use asis_action::{ActionDispatcher, Notification};
use asis_chat::ConversationOrchestrator;
use asis_core::clock::Clock;
use asis_core::config::AsisConfig;
use asis_storage::Database;

/// Shared application state.
///
/// All fields use `Arc` (or are cheap handles) so cloning per request is
/// free. The orchestrator owns the action dispatcher.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AsisConfig>,
    /// SQLite database backing the CRUD routes.
    pub database: Arc<Database>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    /// Fired notifications, streamed to SSE clients.
    pub notifications: broadcast::Sender<Notification>,
    pub clock: Arc<dyn Clock>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AsisConfig,
        database: Arc<Database>,
        orchestrator: Arc<ConversationOrchestrator>,
        notifications: broadcast::Sender<Notification>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            database,
            orchestrator,
            notifications,
            clock,
            start_time: Instant::now(),
        }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        self.orchestrator.dispatcher()
    }
}
