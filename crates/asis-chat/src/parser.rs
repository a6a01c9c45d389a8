//! Structured-reply extraction from free-text LLM output.
//!
//! The model is asked to answer with a single JSON object, but in practice
//! it wraps the object in markdown fences, adds prose around it, or emits
//! slightly broken JSON. [`ResponseParser::parse`] recovers as much as it can
//! and never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use asis_action::Intent;

/// Spoken when nothing usable can be recovered.
pub const DEFAULT_RESPONSE: &str = "Am înțeles cererea ta.";

/// Intent assigned to purely conversational replies.
pub const GENERAL_INTENT: &str = "general";

/// Intent used for replies synthesised after an upstream failure.
pub const ERROR_INTENT: &str = "error";

/// Fragments removed from non-JSON text before it is spoken.
const JSON_ARTIFACTS: [&str; 7] = [
    "```json",
    "```",
    "{",
    "}",
    "\"response\":",
    "\"intent\":",
    "\"action_data\":",
];

/// Below this many characters the cleaned text is not worth speaking.
const MIN_SPOKEN_CHARS: usize = 5;

static RESPONSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""response"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid response regex")
});
static INTENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""intent"\s*:\s*"([^"]+)""#).expect("valid intent regex"));
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("valid name regex"));
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""title"\s*:\s*"([^"]+)""#).expect("valid title regex"));

/// What the assistant understood from one LLM reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReply {
    /// Text to show and speak.
    pub response: String,
    /// Intent name as emitted by the model; `general` when absent.
    pub intent: String,
    /// Object or array (multi-item form) handed to the dispatcher.
    pub action_data: Option<Value>,
    pub needs_confirmation: bool,
    pub follow_up_question: Option<String>,
    pub search_query: Option<String>,
}

impl ParsedReply {
    /// A plain conversational reply.
    pub fn general(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            intent: GENERAL_INTENT.to_string(),
            action_data: None,
            needs_confirmation: false,
            follow_up_question: None,
            search_query: None,
        }
    }

    /// The actionable intent, if the model named one the dispatcher knows.
    pub fn action_intent(&self) -> Option<Intent> {
        self.intent.parse().ok()
    }

    /// Whether the reply asks for a web search before answering.
    pub fn wants_search(&self) -> bool {
        self.intent == Intent::SearchInternet.as_str() || self.search_query.is_some()
    }
}

/// Turns raw LLM text into a [`ParsedReply`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw reply. Never panics and never fails.
    pub fn parse(&self, raw: &str) -> ParsedReply {
        let cleaned = strip_fences(raw);

        match decode_object(cleaned) {
            Some(object) => from_object(object),
            None => {
                debug!(chars = raw.len(), "LLM reply is not valid JSON, recovering");
                recover(raw, cleaned)
            }
        }
    }
}

/// Trim, drop a leading ```` ```json ````/```` ``` ```` and a trailing ```` ``` ````.
fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Strict-decode the span from the first `{` to the last `}`.
fn decode_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Strict JSON decode failed");
            None
        }
    }
}

fn from_object(mut object: Map<String, Value>) -> ParsedReply {
    let response = take_text(&mut object, "response").unwrap_or_else(|| DEFAULT_RESPONSE.to_string());
    let intent = take_text(&mut object, "intent").unwrap_or_else(|| GENERAL_INTENT.to_string());

    let action_data = match object.remove("action_data") {
        Some(data @ (Value::Object(_) | Value::Array(_))) => Some(data),
        Some(Value::String(s)) => bare_string_data(&intent, s.trim()),
        _ => None,
    };

    let needs_confirmation = match object.get("needs_confirmation") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };

    ParsedReply {
        response,
        intent,
        action_data,
        needs_confirmation,
        follow_up_question: take_text(&mut object, "follow_up_question"),
        search_query: take_text(&mut object, "search_query"),
    }
}

/// A non-empty string field; JSON `null`, `"null"` and blanks count as absent.
fn take_text(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "null" {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        _ => None,
    }
}

/// Best-effort extraction from text that is not a valid JSON object.
fn recover(raw: &str, cleaned: &str) -> ParsedReply {
    let response = match RESPONSE_RE.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().replace("\\\"", "\"").replace("\\n", " "),
        None => {
            let mut text = cleaned.to_string();
            for artifact in JSON_ARTIFACTS {
                text = text.replace(artifact, "");
            }
            let text = text.trim();
            if text.chars().count() < MIN_SPOKEN_CHARS {
                DEFAULT_RESPONSE.to_string()
            } else {
                text.to_string()
            }
        }
    };

    let intent = INTENT_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|i| !i.is_empty() && i != "null")
        .unwrap_or_else(|| GENERAL_INTENT.to_string());

    let action_data = if intent == Intent::AddTask.as_str() {
        capture_field(&TITLE_RE, raw, "title")
    } else if intent == Intent::AddShoppingItem.as_str() {
        capture_field(&NAME_RE, raw, "name")
    } else {
        None
    };

    ParsedReply {
        response,
        intent,
        action_data,
        ..ParsedReply::general(String::new())
    }
}

fn capture_field(re: &Regex, raw: &str, key: &str) -> Option<Value> {
    let value = re.captures(raw)?.get(1)?.as_str().to_string();
    Some(single_field(key, value))
}

fn single_field(key: &str, value: String) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value));
    Value::Object(map)
}

/// `"action_data": "lapte"` becomes the intent's main field. Listing intents
/// and unknown intents have no such field, so the text is dropped.
fn bare_string_data(intent: &str, text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    let key = match intent.parse::<Intent>().ok()? {
        Intent::AddTask
        | Intent::ScheduleMeeting
        | Intent::AddCalendarEvent
        | Intent::CancelCalendarEvent => "title",
        Intent::CompleteTask | Intent::DeleteTask | Intent::UpdateTask => "task_title",
        Intent::SetReminder => "message",
        Intent::AddShoppingItem => "name",
        Intent::RemoveShoppingItem | Intent::MarkPurchased => "item_name",
        Intent::SendEmail => "to",
        Intent::SearchInternet => "query",
        Intent::ListTasks | Intent::ListShopping | Intent::ListCalendarEvents => return None,
    };
    Some(single_field(key, text.to_string()))
}
