//! `search_internet`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::error::ActionError;
use crate::payload::{self, lenient_string};
use crate::services::WebSearch;
use crate::types::ActionOutcome;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchFields {
    #[serde(deserialize_with = "lenient_string")]
    query: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    q: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    search_query: Option<String>,
}

pub struct SearchHandler {
    search: Arc<dyn WebSearch>,
}

impl SearchHandler {
    pub fn new(search: Arc<dyn WebSearch>) -> Self {
        Self { search }
    }

    /// Run the search; `data.formatted` carries the LLM context block.
    pub async fn search(&self, data: &Value) -> Result<ActionOutcome, ActionError> {
        let fields: SearchFields = match data {
            Value::String(s) => SearchFields {
                query: Some(s.trim().to_string()).filter(|q| !q.is_empty()),
                ..SearchFields::default()
            },
            other => payload::parse(other)?,
        };
        let query = fields
            .query
            .or(fields.q)
            .or(fields.search_query)
            .ok_or(ActionError::MissingQuery)?;

        let response = self.search.search(&query).await;
        if !response.success {
            return Err(ActionError::SearchFailed(
                response.error.unwrap_or_else(|| "eroare necunoscută".to_string()),
            ));
        }

        info!(query = %query, results = response.results.len(), "Search action completed");
        let message = match response.direct_answer {
            Some(ref answer) => answer.clone(),
            None => format!(
                "Am găsit {} rezultate pentru '{}'.",
                response.results.len(),
                query
            ),
        };
        let formatted = response.format_for_prompt();
        Ok(ActionOutcome::ok(message).with_data(json!({
            "query": query,
            "direct_answer": response.direct_answer,
            "results": response.results,
            "formatted": formatted,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::testing::FakeSearch;

    #[tokio::test]
    async fn test_search_reads_query_aliases() {
        let fake = Arc::new(FakeSearch::default());
        let handler = SearchHandler::new(fake.clone());

        handler.search(&json!({"query": "vremea"})).await.unwrap();
        handler.search(&json!({"q": "știri"})).await.unwrap();
        handler.search(&json!({"search_query": "curs euro"})).await.unwrap();

        assert_eq!(
            *fake.queries.lock().unwrap(),
            vec!["vremea", "știri", "curs euro"]
        );
    }

    #[tokio::test]
    async fn test_search_result_payload() {
        let handler = SearchHandler::new(Arc::new(FakeSearch::default()));
        let outcome = handler.search(&json!({"query": "Cluj"})).await.unwrap();
        assert_eq!(
            outcome.message.as_deref(),
            Some("Am găsit 1 rezultate pentru 'Cluj'.")
        );
        let data = outcome.data.unwrap();
        assert_eq!(data["results"][0]["title"], "Despre Cluj");
        assert!(data["formatted"]
            .as_str()
            .unwrap()
            .starts_with("Rezultate căutare pentru 'Cluj':"));
    }

    #[tokio::test]
    async fn test_missing_query() {
        let handler = SearchHandler::new(Arc::new(FakeSearch::default()));
        let err = handler.search(&json!({})).await.unwrap_err();
        assert!(matches!(err, ActionError::MissingQuery));
    }

    #[tokio::test]
    async fn test_failed_search_is_error() {
        let handler = SearchHandler::new(Arc::new(FakeSearch {
            fail: true,
            ..FakeSearch::default()
        }));
        let err = handler.search(&json!({"query": "x"})).await.unwrap_err();
        assert!(matches!(err, ActionError::SearchFailed(ref m) if m == "offline"));
    }
}
