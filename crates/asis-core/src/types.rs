use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AsisError;

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(AsisError::Validation(format!("unknown role: {}", other))),
        }
    }
}

/// Task priority, stored as 1..=3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn level(&self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    /// Map a numeric level to a priority, clamping out-of-range values.
    pub fn from_level(level: i64) -> Self {
        match level {
            i64::MIN..=1 => Priority::Low,
            2 => Priority::Medium,
            _ => Priority::High,
        }
    }

    /// Parse an English or Romanian priority word.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "scăzută" | "scazuta" | "mică" | "mica" | "redusă" | "redusa" => {
                Some(Priority::Low)
            }
            "medium" | "normal" | "medie" => Some(Priority::Medium),
            "high" | "urgent" | "ridicată" | "ridicata" | "mare" | "importantă" | "importanta" => {
                Some(Priority::High)
            }
            other => other.parse::<i64>().ok().map(Priority::from_level),
        }
    }
}

/// Lifecycle of a calendar event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Scheduled => "scheduled",
            EventStatus::Completed => "completed",
            EventStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for EventStatus {
    type Err = AsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(EventStatus::Scheduled),
            "completed" => Ok(EventStatus::Completed),
            "cancelled" => Ok(EventStatus::Cancelled),
            other => Err(AsisError::Validation(format!("unknown event status: {}", other))),
        }
    }
}

/// Outcome of an external-effect action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        }
    }
}

impl FromStr for ActionStatus {
    type Err = AsisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(AsisError::Validation(format!("unknown action status: {}", other))),
        }
    }
}

// =============================================================================
// Entities
// =============================================================================

/// A persisted chat session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One turn of a conversation. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub content: String,
    pub audio_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            audio_path: None,
            created_at: Utc::now(),
        }
    }
}

/// A to-do item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub priority: Priority,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            due_date: None,
            reminder_date: None,
            completed: false,
            priority: Priority::Low,
            category: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An entry on the shopping list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub id: Uuid,
    pub name: String,
    /// Free text such as "2 kg" or "1".
    pub quantity: String,
    pub category: Option<String>,
    pub purchased: bool,
    pub notes: Option<String>,
    pub price_estimate: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl ShoppingItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            quantity: "1".to_string(),
            category: None,
            purchased: false,
            notes: None,
            price_estimate: None,
            created_at: Utc::now(),
        }
    }
}

/// A meeting or appointment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    /// Identifier assigned by the device calendar, once inserted there.
    pub external_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub meet_link: Option<String>,
    pub attendee_email: Option<String>,
    pub attendee_name: Option<String>,
    pub reminder_enabled: bool,
    pub reminder_time: Option<DateTime<Utc>>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn new(title: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: None,
            title: title.into(),
            description: None,
            start_time,
            end_time,
            meet_link: None,
            attendee_email: None,
            attendee_name: None,
            reminder_enabled: true,
            reminder_time: None,
            status: EventStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit record of an action with an external effect (email, meeting).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: Uuid,
    pub action_type: String,
    pub target: Option<String>,
    /// JSON-encoded action parameters.
    pub content: Option<String>,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl AgentAction {
    pub fn pending(action_type: impl Into<String>, target: Option<String>, content: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type: action_type.into(),
            target,
            content,
            status: ActionStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            error: None,
        }
    }
}
