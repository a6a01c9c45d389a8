//! Typed views over the loosely-typed `action_data` an LLM produces.
//!
//! Models regularly send numbers as strings, booleans as "da", and single
//! objects where a list was expected. The lenient deserializers here absorb
//! those variations so handlers can work with plain Rust types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use asis_core::types::Priority;

use crate::error::ActionError;

/// Decode `data` into `T`; `null` decodes as `T::default()`.
pub fn parse<T: DeserializeOwned + Default>(data: &Value) -> Result<T, ActionError> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone()).map_err(|e| ActionError::InvalidPayload(e.to_string()))
}

/// Expand the multi-item form.
///
/// Accepts a bare array, an object holding an array under `list_key`, or a
/// single object. Plain strings inside a list become `{name_key: string}`.
pub fn items(data: &Value, list_key: &str, name_key: &str) -> Vec<Value> {
    let list = match data {
        Value::Array(list) => Some(list),
        Value::Object(map) => map.get(list_key).and_then(Value::as_array),
        _ => None,
    };

    match list {
        Some(list) => list
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) if !s.trim().is_empty() => {
                    let mut map = Map::new();
                    map.insert(name_key.to_string(), Value::String(s.trim().to_string()));
                    Some(Value::Object(map))
                }
                Value::Object(_) => Some(entry.clone()),
                _ => None,
            })
            .collect(),
        None => vec![data.clone()],
    }
}

/// Whether the data carries anything at all.
pub fn is_empty(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// How a handler should find an existing record.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Id(Uuid),
    Text(String),
}

impl Target {
    /// Prefer a parseable id; an unparseable id is treated as search text.
    pub fn resolve(id: Option<&str>, text: Option<&str>) -> Option<Target> {
        if let Some(raw) = id {
            if let Ok(uuid) = Uuid::parse_str(raw.trim()) {
                return Some(Target::Id(uuid));
            }
        }
        text.or(id)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Target::Text(t.to_string()))
    }
}

// =============================================================================
// Lenient field deserializers
// =============================================================================

/// String from a string, number or bool; blank strings become `None`.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Bool from a bool, a number, or a yes/no word in English or Romanian.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "da" | "yes" | "1" => Some(true),
            "false" | "nu" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Number from a number or a numeric string (comma decimals accepted).
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    })
}

/// Whole number from a number or numeric string.
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_f64(deserializer)?
        .filter(|f| f.is_finite())
        .map(|f| f.round() as i64))
}

/// Priority from a 1-3 number or a priority word.
pub fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().map(|f| Priority::from_level(f.round() as i64)),
        Some(Value::String(s)) => Priority::from_label(&s),
        _ => None,
    })
}
