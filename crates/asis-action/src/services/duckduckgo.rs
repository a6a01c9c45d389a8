//! Web search backed by DuckDuckGo.
//!
//! Organic results are scraped from the HTML endpoint; a direct answer, when
//! DuckDuckGo has one, comes from the Instant Answer JSON API.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use asis_core::config::SearchConfig;

use super::{SearchResponse, SearchResult, WebSearch};
use crate::error::ServiceError;

const HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const ANSWER_ENDPOINT: &str = "https://api.duckduckgo.com/";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    region: String,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            region: config.region.clone(),
            max_results: config.max_results,
        })
    }

    async fn fetch_results(&self, query: &str) -> Result<Vec<SearchResult>, ServiceError> {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("kl", &self.region)
            .finish();
        let url = format!("{}?{}", HTML_ENDPOINT, encoded);

        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ServiceError::Rejected(format!(
                "search returned {}",
                resp.status()
            )));
        }
        let html = resp.text().await?;
        parse_results(&html, self.max_results)
    }

    async fn fetch_instant_answer(&self, query: &str) -> Option<String> {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", query)
            .append_pair("format", "json")
            .append_pair("no_html", "1")
            .append_pair("skip_disambig", "1")
            .finish();
        let url = format!("{}?{}", ANSWER_ENDPOINT, encoded);

        let body: Value = match self.client.get(&url).send().await {
            Ok(resp) => resp.json().await.ok()?,
            Err(e) => {
                debug!(error = %e, "Instant answer lookup failed");
                return None;
            }
        };
        instant_answer(&body)
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> SearchResponse {
        let query = query.trim();
        if query.is_empty() {
            return SearchResponse::failed(query, "empty query");
        }

        let (results, direct_answer) =
            tokio::join!(self.fetch_results(query), self.fetch_instant_answer(query));

        match results {
            Ok(results) => {
                debug!(query, count = results.len(), "Search completed");
                SearchResponse {
                    success: true,
                    query: query.to_string(),
                    direct_answer,
                    results,
                    error: None,
                }
            }
            Err(e) if direct_answer.is_some() => {
                warn!(query, error = %e, "Result page failed; using direct answer only");
                SearchResponse {
                    success: true,
                    query: query.to_string(),
                    direct_answer,
                    results: Vec::new(),
                    error: None,
                }
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                SearchResponse::failed(query, e.to_string())
            }
        }
    }
}

fn selector(css: &str) -> Result<Selector, ServiceError> {
    Selector::parse(css).map_err(|e| ServiceError::InvalidInput(format!("selector {}: {}", css, e)))
}

/// Extract organic results from a DuckDuckGo HTML result page.
pub fn parse_results(html: &str, limit: usize) -> Result<Vec<SearchResult>, ServiceError> {
    let document = Html::parse_document(html);
    let result_selector = selector(".result")?;
    let title_selector = selector(".result__a")?;
    let snippet_selector = selector(".result__snippet")?;
    let url_selector = selector(".result__url")?;

    let mut results = Vec::new();
    for element in document.select(&result_selector) {
        if results.len() >= limit {
            break;
        }
        if element.value().classes().any(|c| c == "result--ad") {
            continue;
        }

        let Some(anchor) = element.select(&title_selector).next() else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        if title.is_empty() {
            continue;
        }

        let snippet = element
            .select(&snippet_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();

        let link = anchor
            .value()
            .attr("href")
            .and_then(resolve_redirect)
            .or_else(|| {
                element
                    .select(&url_selector)
                    .next()
                    .map(|e| e.text().collect::<String>().trim().to_string())
                    .filter(|u| !u.is_empty())
                    .map(|u| if u.starts_with("http") { u } else { format!("https://{}", u) })
            })
            .unwrap_or_default();

        results.push(SearchResult {
            title,
            snippet,
            link,
        });
    }
    Ok(results)
}

/// Result anchors point at `//duckduckgo.com/l/?uddg=<target>`; unwrap them.
fn resolve_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = url::Url::parse(&absolute).ok()?;
    if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }
    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

/// Pick the most direct field of an Instant Answer response.
fn instant_answer(body: &Value) -> Option<String> {
    ["Answer", "AbstractText", "Definition"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}
