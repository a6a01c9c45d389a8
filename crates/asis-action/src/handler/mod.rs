//! Intent handlers.
//!
//! One handler per domain. Each method serves exactly one intent, takes the
//! raw `action_data` and returns either an `ActionOutcome` or an
//! `ActionError` whose text is shown to the user.

pub mod calendar;
pub mod email;
pub mod reminder;
pub mod search;
pub mod shopping;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use asis_core::clock::Clock;
use asis_core::types::{ActionStatus, AgentAction};
use asis_storage::{AgentActionRepository, Database};

pub use calendar::CalendarHandler;
pub use email::EmailHandler;
pub use reminder::ReminderHandler;
pub use search::SearchHandler;
pub use shopping::ShoppingHandler;
pub use task::TaskHandler;

/// Writes the audit trail for actions with an external effect.
///
/// Audit failures never fail the action itself; they are logged and the
/// action proceeds.
pub struct AuditLog {
    repo: AgentActionRepository,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: AgentActionRepository::new(db),
            clock,
        }
    }

    /// Record a pending action. Returns its id when the write succeeded.
    pub fn begin(&self, action_type: &str, target: Option<&str>, content: Option<String>) -> Option<Uuid> {
        let mut action = AgentAction::pending(action_type, target.map(str::to_string), content);
        action.created_at = self.clock.now();
        match self.repo.create(&action) {
            Ok(()) => Some(action.id),
            Err(e) => {
                warn!(action_type, error = %e, "Failed to record agent action");
                None
            }
        }
    }

    /// Finalise an action started with [`AuditLog::begin`].
    pub fn finish(&self, id: Option<Uuid>, error: Option<&str>) {
        let Some(id) = id else { return };
        let status = if error.is_some() {
            ActionStatus::Failed
        } else {
            ActionStatus::Completed
        };
        if let Err(e) = self.repo.finish(id, status, error, self.clock.now()) {
            warn!(action_id = %id, error = %e, "Failed to finalise agent action");
        }
    }
}

/// `"a, b, c"`, the way multi-item confirmations list names.
pub(crate) fn join_names<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names.into_iter().collect::<Vec<_>>().join(", ")
}
