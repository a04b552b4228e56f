use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{SearchHit, ToolCapability};
use crate::error::ProviderFailure;

pub const DEFAULT_ARXIV_ENDPOINT: &str = "http://export.arxiv.org/api/query";

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

#[derive(Debug, Default, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Academic search through the public arXiv Atom API.
pub struct ArxivSearch {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl ArxivSearch {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ARXIV_ENDPOINT.to_string(),
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

impl Default for ArxivSearch {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|value| WHITESPACE.replace_all(value.trim(), " ").into_owned())
        .filter(|value| !value.is_empty())
}

/// Extract entries from an Atom feed. Rank order becomes a decaying relevance.
fn parse_feed(feed: &str) -> Result<Vec<SearchHit>, quick_xml::DeError> {
    let feed: Feed = quick_xml::de::from_str(feed)?;
    let hits = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let summary = normalize(entry.summary)?;
            let source = normalize(entry.id)?;
            let text = match normalize(entry.title) {
                Some(title) => format!("{title}: {summary}"),
                None => summary,
            };
            Some((text, source))
        })
        .enumerate()
        .map(|(rank, (text, source))| {
            SearchHit::new(text, source).with_relevance(1.0 / (rank as f32 + 1.0))
        })
        .collect();
    Ok(hits)
}

#[async_trait]
impl ToolCapability for ArxivSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderFailure> {
        let max_results = self.max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("search_query", query), ("max_results", max_results.as_str())])
            .send()
            .await
            .map_err(|err| ProviderFailure::new("arxiv", format!("request error: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderFailure::new("arxiv", format!("HTTP status {status}")));
        }

        let feed = response
            .text()
            .await
            .map_err(|err| ProviderFailure::new("arxiv", format!("invalid body: {err}")))?;

        let hits = parse_feed(&feed)
            .map_err(|err| ProviderFailure::new("arxiv", format!("malformed feed: {err}")))?;
        debug!(%query, hits = hits.len(), "arxiv search completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query: search_query=ti:surface</title>
  <id>http://arxiv.org/api/query</id>
  <entry>
    <id>http://arxiv.org/abs/1208.0928v2</id>
    <title>Surface codes: Towards practical
      large-scale quantum computation</title>
    <summary>  This article provides an introduction to surface code
      quantum computing.
    </summary>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/0000.0000v1</id>
    <title>No abstract</title>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/quant-ph/9705052v1</id>
    <title>Stabilizer Codes and Quantum Error Correction</title>
    <summary>Thesis on stabilizer codes.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_entries_and_skips_incomplete_ones() {
        let hits = parse_feed(FEED).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(
            hits[0].text,
            "Surface codes: Towards practical large-scale quantum computation: This article provides an introduction to surface code quantum computing."
        );
        assert_eq!(hits[0].source, "http://arxiv.org/abs/1208.0928v2");
        assert_eq!(hits[0].relevance, Some(1.0));
        assert_eq!(hits[1].relevance, Some(0.5));
    }

    #[test]
    fn entities_are_decoded() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <title>Codes &amp; Decoders</title>
    <summary>Bound d &lt; n holds</summary>
  </entry>
</feed>"#;
        let hits = parse_feed(feed).unwrap();
        assert_eq!(hits[0].text, "Codes & Decoders: Bound d < n holds");
    }

    #[test]
    fn empty_feed_has_no_hits() {
        assert!(parse_feed("<feed></feed>").unwrap().is_empty());
    }

    #[test]
    fn truncated_feed_is_an_error() {
        assert!(parse_feed("<feed><entry><id>x</id>").is_err());
    }
}
