//! Shopping list intents.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use asis_core::clock::Clock;
use asis_core::types::ShoppingItem;
use asis_storage::{Database, ShoppingFilter, ShoppingRepository};

use crate::error::ActionError;
use crate::handler::join_names;
use crate::payload::{self, lenient_bool, lenient_f64, lenient_string, Target};
use crate::types::ActionOutcome;

const DEFAULT_NAME: &str = "Item";
const DEFAULT_QUANTITY: &str = "1";

/// Definite-article endings, longest first.
const ARTICLE_SUFFIXES: &[&str] = &["urile", "ele", "ule", "ul", "le", "ii", "a"];

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemFields {
    #[serde(deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    quantity: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    notes: Option<String>,
    #[serde(deserialize_with = "lenient_f64", alias = "price_estimate")]
    price: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListFields {
    #[serde(deserialize_with = "lenient_bool")]
    purchased: Option<bool>,
    #[serde(deserialize_with = "lenient_string")]
    category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LookupFields {
    #[serde(deserialize_with = "lenient_string")]
    item_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    item_name: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    purchased: Option<bool>,
}

impl LookupFields {
    fn target(&self) -> Result<Target, ActionError> {
        Target::resolve(
            self.item_id.as_deref(),
            self.item_name.as_deref().or(self.name.as_deref()),
        )
        .ok_or(ActionError::MissingField("numele produsului"))
    }
}

pub struct ShoppingHandler {
    repo: ShoppingRepository,
    clock: Arc<dyn Clock>,
}

impl ShoppingHandler {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: ShoppingRepository::new(db),
            clock,
        }
    }

    /// `add_shopping_item`: one item, or several in list form.
    pub fn add(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let entries = payload::items(data, "items", "name");
        if entries.is_empty() {
            return Err(ActionError::MissingField("numele produsului"));
        }

        let mut created = Vec::with_capacity(entries.len());
        for entry in &entries {
            created.push(self.create_one(entry)?);
        }

        if let [item] = created.as_slice() {
            return Ok(ActionOutcome::ok(format!(
                "'{}' a fost adăugat la lista de cumpărături.",
                item.name
            ))
            .with_data(json!({ "item": item, "count": 1 })));
        }

        let names = join_names(created.iter().map(|i| i.name.as_str()));
        Ok(
            ActionOutcome::ok(format!("Am adăugat {} produse pe listă: {}.", created.len(), names))
                .with_data(json!({ "items": created, "count": created.len() })),
        )
    }

    fn create_one(&self, entry: &Value) -> Result<ShoppingItem, ActionError> {
        let fields: ItemFields = payload::parse(entry)?;
        let mut item = ShoppingItem::new(fields.name.unwrap_or_else(|| DEFAULT_NAME.to_string()));
        item.created_at = self.clock.now();
        item.quantity = fields.quantity.unwrap_or_else(|| DEFAULT_QUANTITY.to_string());
        item.category = fields.category;
        item.notes = fields.notes;
        item.price_estimate = fields.price;

        self.repo.create(&item)?;
        info!(item_id = %item.id, name = %item.name, "Shopping item added");
        Ok(item)
    }

    /// `list_shopping`: items still to buy unless `purchased` is set.
    pub fn list(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: ListFields = payload::parse(data)?;
        let filter = ShoppingFilter {
            purchased: Some(fields.purchased.unwrap_or(false)),
            category: fields.category,
        };
        let items = self.repo.list(&filter)?;
        let message = if items.is_empty() {
            "Lista ta de cumpărături este goală.".to_string()
        } else {
            format!("Ai {} produse pe listă.", items.len())
        };
        Ok(ActionOutcome::ok(message).with_data(json!({ "items": items, "count": items.len() })))
    }

    /// `remove_shopping_item`; with `purchased: true` the item is only ticked off.
    pub fn remove(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: LookupFields = payload::parse(data)?;
        if fields.purchased == Some(true) {
            return self.purchase(&fields);
        }

        let item = self.find(&fields.target()?)?;
        if !self.repo.delete(item.id)? {
            return Err(ActionError::ItemNotFound);
        }
        info!(item_id = %item.id, "Shopping item removed");
        Ok(
            ActionOutcome::ok(format!("'{}' a fost șters de pe listă.", item.name))
                .with_data(json!({ "item_id": item.id })),
        )
    }

    /// `mark_purchased`.
    pub fn mark_purchased(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: LookupFields = payload::parse(data)?;
        self.purchase(&fields)
    }

    fn purchase(&self, fields: &LookupFields) -> Result<ActionOutcome, ActionError> {
        let item = self.find(&fields.target()?)?;
        let item = self
            .repo
            .set_purchased(item.id, true)?
            .ok_or(ActionError::ItemNotFound)?;
        info!(item_id = %item.id, "Shopping item purchased");
        Ok(
            ActionOutcome::ok(format!("'{}' a fost marcat ca cumpărat.", item.name))
                .with_data(json!({ "item": item })),
        )
    }

    /// Text lookups try the article-stripped word, then the raw text, among
    /// items still to buy; only then the whole list.
    fn find(&self, target: &Target) -> Result<ShoppingItem, ActionError> {
        let text = match target {
            Target::Id(id) => return self.repo.get(*id)?.ok_or(ActionError::ItemNotFound),
            Target::Text(text) => text,
        };

        let pending = ShoppingFilter::pending();
        let stripped = strip_article(text);
        if stripped != *text {
            if let Some(item) = self.repo.find_by_name(&stripped, &pending)? {
                return Ok(item);
            }
        }
        if let Some(item) = self.repo.find_by_name(text, &pending)? {
            return Ok(item);
        }
        self.repo
            .find_by_name(text, &ShoppingFilter::default())?
            .ok_or(ActionError::ItemNotFound)
    }
}

/// Drop a Romanian definite article: "laptele" -> "lapt", "pâinea" -> "pâine".
fn strip_article(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let len = lower.chars().count();
    for suffix in ARTICLE_SUFFIXES {
        let suffix_len = suffix.chars().count();
        if len > suffix_len + 2 && lower.ends_with(suffix) {
            return lower.chars().take(len - suffix_len).collect();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing;

    fn handler() -> ShoppingHandler {
        let db = Arc::new(Database::in_memory().unwrap());
        ShoppingHandler::new(db, testing::clock())
    }

    fn names(outcome: &ActionOutcome) -> Vec<String> {
        outcome.data.as_ref().unwrap()["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_add_multiple_items() {
        let handler = handler();
        let outcome = handler
            .add(&json!({"items": [{"name": "lapte"}, {"name": "pâine"}]}))
            .unwrap();
        assert_eq!(outcome.data.as_ref().unwrap()["count"], 2);
        assert_eq!(
            outcome.message.as_deref(),
            Some("Am adăugat 2 produse pe listă: lapte, pâine.")
        );
        assert_eq!(names(&handler.list(&json!({})).unwrap()), vec!["lapte", "pâine"]);
    }

    #[test]
    fn test_add_single_with_defaults() {
        let handler = handler();
        let outcome = handler.add(&json!({"price": "4,5"})).unwrap();
        let item = &outcome.data.unwrap()["item"];
        assert_eq!(item["name"], DEFAULT_NAME);
        assert_eq!(item["quantity"], "1");
        assert_eq!(item["price_estimate"], 4.5);
    }

    #[test]
    fn test_add_plain_string_list() {
        let handler = handler();
        let outcome = handler.add(&json!({"items": ["ouă", "unt"]})).unwrap();
        assert_eq!(outcome.data.unwrap()["count"], 2);
    }

    #[test]
    fn test_remove_with_article() {
        let handler = handler();
        handler.add(&json!({"name": "Lapte", "quantity": "2 l"})).unwrap();

        let outcome = handler.remove(&json!({"item_name": "laptele"})).unwrap();
        assert_eq!(outcome.message.as_deref(), Some("'Lapte' a fost șters de pe listă."));
        assert!(names(&handler.list(&json!({})).unwrap()).is_empty());
    }

    #[test]
    fn test_remove_with_purchased_flag_marks_instead() {
        let handler = handler();
        handler.add(&json!({"name": "pâine"})).unwrap();

        let outcome = handler
            .remove(&json!({"item_name": "pâinea", "purchased": true}))
            .unwrap();
        assert_eq!(outcome.message.as_deref(), Some("'pâine' a fost marcat ca cumpărat."));
        assert_eq!(names(&handler.list(&json!({"purchased": true})).unwrap()), vec!["pâine"]);
    }

    #[test]
    fn test_mark_purchased_missing_item() {
        let handler = handler();
        let err = handler.mark_purchased(&json!({"item_name": "cafea"})).unwrap_err();
        assert!(matches!(err, ActionError::ItemNotFound));
        assert_eq!(err.to_string(), "Produsul nu a fost găsit pe listă.");
    }

    #[test]
    fn test_empty_list_message() {
        let handler = handler();
        let outcome = handler.list(&Value::Null).unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Lista ta de cumpărături este goală.")
        );
    }

    #[test]
    fn test_strip_article() {
        assert_eq!(strip_article("laptele"), "lapt");
        assert_eq!(strip_article("pâinea"), "pâine");
        assert_eq!(strip_article("roșiile"), "roșii");
        assert_eq!(strip_article("ouăle"), "ouă");
        assert_eq!(strip_article("mere"), "mere");
        assert_eq!(strip_article("ua"), "ua");
    }
}
