//! Spoken summaries for listing intents.
//!
//! A listing reply from the model is written before the data is known, so
//! after a successful listing action the spoken text is rebuilt from the
//! outcome data instead.

use chrono::{DateTime, Utc};
use serde_json::Value;

use asis_action::{DateParser, Intent};

/// Spoken text for a listing intent, or `None` for other intents.
pub fn list_summary(intent: Intent, data: Option<&Value>, dates: &DateParser) -> Option<String> {
    let empty = Value::Null;
    let data = data.unwrap_or(&empty);

    match intent {
        Intent::ListShopping => {
            let names = field_list(data, "items", "name");
            Some(if names.is_empty() {
                "Lista ta de cumpărături este goală.".to_string()
            } else {
                format!("Pe lista ta de cumpărături ai: {}.", names.join(", "))
            })
        }
        Intent::ListTasks => {
            let titles = field_list(data, "tasks", "title");
            Some(if titles.is_empty() {
                "Nu ai niciun task activ.".to_string()
            } else {
                format!("Ai următoarele task-uri: {}.", titles.join(", "))
            })
        }
        Intent::ListCalendarEvents => {
            let events = event_lines(data, dates);
            Some(if events.is_empty() {
                "Nu ai evenimente programate.".to_string()
            } else {
                format!(
                    "Ai {} evenimente programate: {}.",
                    events.len(),
                    events.join(", ")
                )
            })
        }
        _ => None,
    }
}

fn field_list(data: &Value, list_key: &str, field: &str) -> Vec<String> {
    data.get(list_key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get(field).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn event_lines(data: &Value, dates: &DateParser) -> Vec<String> {
    let Some(events) = data.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };
    events
        .iter()
        .filter_map(|event| {
            let title = event.get("title").and_then(Value::as_str)?;
            let start = event
                .get("start_time")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok());
            Some(match start {
                Some(start) => format!("{} pe {}", title, dates.display(start)),
                None => title.to_string(),
            })
        })
        .collect()
}
