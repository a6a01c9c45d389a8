//! The closed set of actions the assistant can perform.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// An actionable intent recognised in an LLM reply.
///
/// Conversational replies (`general`, `error`) are not intents; they never
/// reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    AddTask,
    ListTasks,
    CompleteTask,
    DeleteTask,
    UpdateTask,
    SetReminder,
    AddShoppingItem,
    ListShopping,
    RemoveShoppingItem,
    MarkPurchased,
    SendEmail,
    SearchInternet,
    ScheduleMeeting,
    AddCalendarEvent,
    ListCalendarEvents,
    CancelCalendarEvent,
}

impl Intent {
    pub const ALL: [Intent; 16] = [
        Intent::AddTask,
        Intent::ListTasks,
        Intent::CompleteTask,
        Intent::DeleteTask,
        Intent::UpdateTask,
        Intent::SetReminder,
        Intent::AddShoppingItem,
        Intent::ListShopping,
        Intent::RemoveShoppingItem,
        Intent::MarkPurchased,
        Intent::SendEmail,
        Intent::SearchInternet,
        Intent::ScheduleMeeting,
        Intent::AddCalendarEvent,
        Intent::ListCalendarEvents,
        Intent::CancelCalendarEvent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::AddTask => "add_task",
            Intent::ListTasks => "list_tasks",
            Intent::CompleteTask => "complete_task",
            Intent::DeleteTask => "delete_task",
            Intent::UpdateTask => "update_task",
            Intent::SetReminder => "set_reminder",
            Intent::AddShoppingItem => "add_shopping_item",
            Intent::ListShopping => "list_shopping",
            Intent::RemoveShoppingItem => "remove_shopping_item",
            Intent::MarkPurchased => "mark_purchased",
            Intent::SendEmail => "send_email",
            Intent::SearchInternet => "search_internet",
            Intent::ScheduleMeeting => "schedule_meeting",
            Intent::AddCalendarEvent => "add_calendar_event",
            Intent::ListCalendarEvents => "list_calendar_events",
            Intent::CancelCalendarEvent => "cancel_calendar_event",
        }
    }

    /// Listing intents run even when the LLM supplies no action data.
    pub fn is_listing(&self) -> bool {
        matches!(
            self,
            Intent::ListTasks | Intent::ListShopping | Intent::ListCalendarEvents
        )
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Intent::ALL
            .iter()
            .copied()
            .find(|intent| intent.as_str() == wanted)
            .ok_or_else(|| ActionError::UnknownIntent(wanted.to_string()))
    }
}
