//! `set_reminder`: a local notification, optionally tied to a task.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use asis_core::clock::Clock;
use asis_storage::Database;

use crate::date_parser::DateParser;
use crate::error::ActionError;
use crate::handler::TaskHandler;
use crate::payload::{self, lenient_string, Target};
use crate::services::{Notification, NotificationScheduler};
use crate::types::ActionOutcome;

const REMINDER_TITLE: &str = "Reamintire";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReminderFields {
    #[serde(deserialize_with = "lenient_string")]
    message: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    task_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    task_title: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    reminder_date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    time: Option<String>,
}

pub struct ReminderHandler {
    tasks: TaskHandler,
    notifications: Arc<dyn NotificationScheduler>,
    dates: DateParser,
    clock: Arc<dyn Clock>,
}

impl ReminderHandler {
    pub fn new(
        db: Arc<Database>,
        notifications: Arc<dyn NotificationScheduler>,
        dates: DateParser,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks: TaskHandler::new(db, dates, Arc::clone(&clock)),
            notifications,
            dates,
            clock,
        }
    }

    pub async fn set(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: ReminderFields = payload::parse(data)?;
        let now = self.clock.now();
        let when = self.resolve_time(&fields, now)?;
        if when <= now {
            return Err(ActionError::ReminderInPast);
        }

        let task = match Target::resolve(fields.task_id.as_deref(), fields.task_title.as_deref()) {
            Some(target) => Some(self.tasks.find(&target, true)?),
            None => None,
        };

        let text = fields
            .message
            .or(fields.title)
            .or_else(|| task.as_ref().map(|t| t.title.clone()))
            .ok_or(ActionError::MissingField("mesajul reamintirii"))?;

        let id = match task {
            Some(ref task) => format!("task-{}-reminder", task.id),
            None => format!("reminder-{}", Uuid::new_v4()),
        };
        self.notifications
            .schedule_at(Notification {
                id: id.clone(),
                title: REMINDER_TITLE.to_string(),
                body: text.clone(),
                at: when,
                payload: task.as_ref().map(|t| t.id.to_string()),
            })
            .await
            .map_err(|e| ActionError::NotificationFailed(e.to_string()))?;

        if let Some(mut task) = task {
            task.reminder_date = Some(when);
            self.tasks.repo().update(&task)?;
        }

        info!(notification = %id, at = %when, "Reminder set");
        Ok(ActionOutcome::ok(format!(
            "Îți voi reaminti: '{}' pe {}.",
            text,
            self.dates.display(when)
        ))
        .with_data(json!({ "notification_id": id, "at": when, "message": text })))
    }

    /// `reminder_date` or `date` (optionally with `time`); a bare `time`
    /// means the next occurrence of that time of day.
    fn resolve_time(
        &self,
        fields: &ReminderFields,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ActionError> {
        let time = fields.time.as_deref();
        if let Some(raw) = fields.reminder_date.as_deref().or(fields.date.as_deref()) {
            return self
                .dates
                .combine(raw, time, now)
                .ok_or_else(|| ActionError::UnparseableDate(raw.to_string()));
        }

        let raw = time.ok_or(ActionError::MissingDate)?;
        let today = self
            .dates
            .combine("azi", Some(raw), now)
            .ok_or_else(|| ActionError::UnparseableDate(raw.to_string()))?;
        Ok(if today > now {
            today
        } else {
            today + Duration::days(1)
        })
    }
}
