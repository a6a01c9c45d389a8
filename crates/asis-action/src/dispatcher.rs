//! Intent dispatch.
//!
//! Maps every [`Intent`] to exactly one handler method. Handler errors are
//! converted into failed outcomes here, so callers only ever see an
//! [`ActionOutcome`].

use std::sync::Arc;

use chrono::FixedOffset;
use serde_json::Value;
use tracing::{debug, warn};

use asis_core::clock::Clock;
use asis_core::config::AsisConfig;
use asis_storage::Database;

use crate::date_parser::DateParser;
use crate::error::ActionError;
use crate::handler::{
    AuditLog, CalendarHandler, EmailHandler, ReminderHandler, SearchHandler, ShoppingHandler,
    TaskHandler,
};
use crate::intent::Intent;
use crate::services::Services;
use crate::types::ActionOutcome;

/// Knobs the handlers read from configuration.
#[derive(Debug, Clone)]
pub struct ActionSettings {
    /// Receives confirmation copies of scheduled meetings.
    pub self_address: Option<String>,
    /// Minutes before a meeting that the early notification fires.
    pub lead_minutes: i64,
    /// Alarm offset written to device calendar entries.
    pub reminder_minutes: i64,
    /// Offset used to read naive dates and to render times.
    pub utc_offset: FixedOffset,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self::from_config(&AsisConfig::default())
    }
}

impl ActionSettings {
    pub fn from_config(config: &AsisConfig) -> Self {
        Self {
            self_address: config.email.confirmation_address().map(str::to_string),
            lead_minutes: config.notifications.lead_minutes,
            reminder_minutes: config.calendar.reminder_minutes,
            utc_offset: config.utc_offset(),
        }
    }
}

pub struct ActionDispatcher {
    tasks: TaskHandler,
    shopping: ShoppingHandler,
    email: EmailHandler,
    search: SearchHandler,
    calendar: CalendarHandler,
    reminders: ReminderHandler,
    dates: DateParser,
}

impl ActionDispatcher {
    pub fn new(
        db: Arc<Database>,
        services: Services,
        clock: Arc<dyn Clock>,
        settings: ActionSettings,
    ) -> Self {
        let dates = DateParser::new(settings.utc_offset);
        let audit = Arc::new(AuditLog::new(Arc::clone(&db), Arc::clone(&clock)));

        Self {
            tasks: TaskHandler::new(Arc::clone(&db), dates, Arc::clone(&clock)),
            shopping: ShoppingHandler::new(Arc::clone(&db), Arc::clone(&clock)),
            email: EmailHandler::new(Arc::clone(&services.email), Arc::clone(&audit)),
            search: SearchHandler::new(Arc::clone(&services.search)),
            reminders: ReminderHandler::new(
                Arc::clone(&db),
                Arc::clone(&services.notifications),
                dates,
                Arc::clone(&clock),
            ),
            calendar: CalendarHandler::new(db, services, audit, clock, settings),
            dates,
        }
    }

    /// The date heuristic in the user's offset.
    pub fn dates(&self) -> &DateParser {
        &self.dates
    }

    /// Run one intent. Never fails: errors become `success: false`.
    pub async fn dispatch(&self, intent: Intent, data: &Value) -> ActionOutcome {
        debug!(intent = %intent, "Dispatching action");
        match self.run(intent, data).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(intent = %intent, error = %e, "Action failed");
                ActionOutcome::failure(e.to_string())
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch) for an intent given by name.
    pub async fn dispatch_named(&self, name: &str, data: &Value) -> ActionOutcome {
        match name.parse::<Intent>() {
            Ok(intent) => self.dispatch(intent, data).await,
            Err(e) => {
                warn!(intent = name, "Unknown intent");
                ActionOutcome::failure(e.to_string())
            }
        }
    }

    async fn run(&self, intent: Intent, data: &Value) -> Result<ActionOutcome, ActionError> {
        match intent {
            Intent::AddTask => self.tasks.add(data),
            Intent::ListTasks => self.tasks.list(data),
            Intent::CompleteTask => self.tasks.complete(data),
            Intent::DeleteTask => self.tasks.delete(data),
            Intent::UpdateTask => self.tasks.update(data),
            Intent::SetReminder => self.reminders.set(data).await,
            Intent::AddShoppingItem => self.shopping.add(data),
            Intent::ListShopping => self.shopping.list(data),
            Intent::RemoveShoppingItem => self.shopping.remove(data),
            Intent::MarkPurchased => self.shopping.mark_purchased(data),
            Intent::SendEmail => self.email.send(data).await,
            Intent::SearchInternet => self.search.search(data).await,
            Intent::ScheduleMeeting => self.calendar.schedule_meeting(data).await,
            Intent::AddCalendarEvent => self.calendar.add_event(data).await,
            Intent::ListCalendarEvents => self.calendar.list_events(data),
            Intent::CancelCalendarEvent => self.calendar.cancel_event(data).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::{self, Fakes};
    use asis_core::types::EventStatus;
    use asis_storage::{CalendarFilter, CalendarRepository, TaskFilter, TaskRepository};
    use serde_json::json;

    fn dispatcher(fakes: &Fakes) -> (ActionDispatcher, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let settings = ActionSettings {
            utc_offset: DateParser::utc().offset(),
            ..ActionSettings::default()
        };
        (
            ActionDispatcher::new(Arc::clone(&db), fakes.services(), testing::clock(), settings),
            db,
        )
    }

    #[tokio::test]
    async fn test_add_then_list_tasks() {
        let fakes = Fakes::default();
        let (dispatcher, _) = dispatcher(&fakes);

        let added = dispatcher.dispatch(Intent::AddTask, &json!({"title": "X"})).await;
        assert!(added.success);

        let listed = dispatcher
            .dispatch(Intent::ListTasks, &json!({"completed": false}))
            .await;
        let tasks = listed.data.unwrap()["tasks"].as_array().unwrap().clone();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["title"], "X");
    }

    #[tokio::test]
    async fn test_multi_item_shopping() {
        let fakes = Fakes::default();
        let (dispatcher, _) = dispatcher(&fakes);

        let outcome = dispatcher
            .dispatch(
                Intent::AddShoppingItem,
                &json!({"items": [{"name": "lapte"}, {"name": "pâine"}]}),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["count"], 2);
    }

    #[tokio::test]
    async fn test_not_found_is_failed_outcome_without_writes() {
        let fakes = Fakes::default();
        let (dispatcher, db) = dispatcher(&fakes);

        let outcome = dispatcher
            .dispatch(Intent::CompleteTask, &json!({"task_title": "doctor"}))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Task-ul nu a fost găsit."));
        assert!(TaskRepository::new(db)
            .list(&TaskFilter::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_meeting_persisted_despite_email_failure() {
        let fakes = Fakes::with_failing_email();
        let (dispatcher, db) = dispatcher(&fakes);

        let outcome = dispatcher
            .dispatch(
                Intent::ScheduleMeeting,
                &json!({
                    "title": "Interviu",
                    "start_time": "2024-05-02T14:00:00Z",
                    "attendee_email": "candidat@example.com"
                }),
            )
            .await;
        assert!(outcome.success);

        let events = CalendarRepository::new(db)
            .list(&CalendarFilter::default())
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_unknown_intent_name() {
        let fakes = Fakes::default();
        let (dispatcher, _) = dispatcher(&fakes);

        let outcome = dispatcher.dispatch_named("fly_to_moon", &json!({})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Acțiune necunoscută: fly_to_moon"));
    }

    #[tokio::test]
    async fn test_dispatch_named_routes_known_intent() {
        let fakes = Fakes::default();
        let (dispatcher, _) = dispatcher(&fakes);

        let outcome = dispatcher
            .dispatch_named("search_internet", &json!({"query": "vremea"}))
            .await;
        assert!(outcome.success);
        assert_eq!(*fakes.search.queries.lock().unwrap(), vec!["vremea"]);
    }

    #[tokio::test]
    async fn test_invalid_payload_shape() {
        let fakes = Fakes::default();
        let (dispatcher, _) = dispatcher(&fakes);

        let outcome = dispatcher
            .dispatch(Intent::SendEmail, &json!(42))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().starts_with("Date invalide"));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AsisConfig::default();
        config.email.smtp_user = "eu@example.com".to_string();
        config.notifications.lead_minutes = 15;

        let settings = ActionSettings::from_config(&config);
        assert_eq!(settings.self_address.as_deref(), Some("eu@example.com"));
        assert_eq!(settings.lead_minutes, 15);
        assert_eq!(settings.utc_offset.local_minus_utc(), 120 * 60);
    }
}
