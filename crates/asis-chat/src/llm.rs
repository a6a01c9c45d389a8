//! LLM client contract and the Gemini REST implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use asis_core::clock::Clock;
use asis_core::config::LlmConfig;
use asis_core::types::Role;

use crate::error::ChatError;
use crate::history::Turn;
use crate::prompt;

/// A hosted chat model that answers in free text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Answer `message` given the preceding turns, oldest first.
    async fn chat(&self, message: &str, history: &[Turn]) -> Result<String, ChatError>;

    /// Answer `message` with extra context (search results) prepended.
    async fn chat_with_context(
        &self,
        message: &str,
        context: &str,
        history: &[Turn],
    ) -> Result<String, ChatError> {
        self.chat(&prompt::with_search_context(message, context), history)
            .await
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

// =============================================================================
// GeminiClient
// =============================================================================

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    config: LlmConfig,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl GeminiClient {
    pub fn new(
        config: &LlmConfig,
        offset: FixedOffset,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            offset,
            clock,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.trim().is_empty()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    fn build_request(&self, message: &str, history: &[Turn]) -> GenerateRequest {
        let now = self.clock.now().with_timezone(&self.offset);

        let mut contents: Vec<Content> = history
            .iter()
            .filter(|turn| !turn.content.trim().is_empty())
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Content::text(Some(role), turn.content.as_str())
            })
            .collect();
        contents.push(Content::text(Some("user"), message));

        GenerateRequest {
            system_instruction: Content::text(None, prompt::system_prompt(now)),
            contents,
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
                top_k: self.config.top_k,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, message: &str, history: &[Turn]) -> Result<String, ChatError> {
        if !self.is_configured() {
            return Err(ChatError::NotConfigured("Gemini API key"));
        }

        let request = self.build_request(message, history);
        debug!(model = %self.config.model, turns = request.contents.len(), "Calling Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Gemini request rejected");
            let excerpt: String = body.chars().take(300).collect();
            return Err(ChatError::Llm(format!("HTTP {}: {}", status.as_u16(), excerpt)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::Llm(format!("invalid Gemini response: {}", e)))?;
        extract_text(parsed)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response: GenerateResponse) -> Result<String, ChatError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(ChatError::Llm(format!("empty response ({})", reason)));
    }
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asis_core::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn client(api_key: &str) -> GeminiClient {
        let config = LlmConfig {
            api_key: api_key.to_string(),
            ..LlmConfig::default()
        };
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()));
        GeminiClient::new(&config, FixedOffset::east_opt(7200).unwrap(), clock).unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client("k").endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_shape() {
        let history = vec![Turn::user("salut"), Turn::assistant("bună"), Turn::user("  ")];
        let request = client("k").build_request("ce faci?", &history);
        let value = serde_json::to_value(&request).unwrap();

        let contents = value["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "ce faci?");

        assert!(value["systemInstruction"].get("role").is_none());
        assert!(value["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Data curentă: 2024-05-01, ora: 12:00."));

        let generation = &value["generationConfig"];
        assert_eq!(generation["topK"], 40);
        assert_eq!(generation["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "{\"response\": "},
                {"text": "\"Salut\"}\n"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "{\"response\": \"Salut\"}");
    }

    #[test]
    fn test_extract_text_blocked() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = extract_text(response).unwrap_err();
        assert_eq!(err.to_string(), "LLM error: empty response (SAFETY)");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let err = client("").chat("salut", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured(_)));
    }
}
