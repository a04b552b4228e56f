use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SearchHit, ToolCapability};
use crate::error::ProviderFailure;
use crate::security::SecretValue;

pub const DEFAULT_TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";

/// Web search through the Tavily API.
pub struct TavilySearch {
    client: Client,
    api_key: SecretValue,
    endpoint: String,
    max_results: usize,
}

impl TavilySearch {
    pub fn new(api_key: SecretValue) -> Self {
        Self {
            client: Client::new(),
            api_key,
            endpoint: DEFAULT_TAVILY_ENDPOINT.to_string(),
            max_results: 3,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: Option<f32>,
}

fn into_hits(response: TavilyResponse) -> Vec<SearchHit> {
    response
        .results
        .into_iter()
        .filter(|result| !result.content.trim().is_empty())
        .map(|result| {
            let text = match result.title {
                Some(title) if !title.trim().is_empty() => {
                    format!("{}: {}", title.trim(), result.content.trim())
                }
                _ => result.content.trim().to_string(),
            };
            SearchHit {
                text,
                source: result.url,
                relevance: result.score,
            }
        })
        .collect()
}

#[async_trait]
impl ToolCapability for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderFailure> {
        let request = TavilyRequest {
            api_key: self.api_key.expose(),
            query,
            max_results: self.max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderFailure::new("tavily", format!("request error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderFailure::new("tavily", format!("HTTP status {status}")));
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|err| ProviderFailure::new("tavily", format!("invalid response: {err}")))?;

        let hits = into_hits(payload);
        debug!(%query, hits = hits.len(), "tavily search completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_results_to_hits() {
        let raw = r#"{
            "query": "surface codes",
            "results": [
                {"title": "Surface code", "url": "https://en.wikipedia.org/wiki/Surface_code",
                 "content": "A topological quantum error correcting code.", "score": 0.91},
                {"title": "Empty", "url": "https://example.com/empty", "content": "  "}
            ]
        }"#;
        let hits = into_hits(serde_json::from_str(raw).unwrap());

        assert_eq!(hits.len(), 1);
        assert_eq!(
            hits[0].text,
            "Surface code: A topological quantum error correcting code."
        );
        assert_eq!(hits[0].source, "https://en.wikipedia.org/wiki/Surface_code");
        assert_eq!(hits[0].relevance, Some(0.91));
    }

    #[test]
    fn missing_results_field_is_empty() {
        let hits = into_hits(serde_json::from_str("{}").unwrap());
        assert!(hits.is_empty());
    }
}
