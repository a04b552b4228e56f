use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{SearchHit, ToolCapability};
use crate::error::ProviderFailure;

const ANY_QUERY: &str = "*";

type Outcome = Result<Vec<SearchHit>, ProviderFailure>;

/// Scripted in-memory tool for tests and offline runs.
///
/// Outcomes queued for an exact query take precedence over the catch-all queue.
/// Once both are drained every query returns no results.
pub struct StubSearch {
    outcomes: DashMap<String, VecDeque<Outcome>>,
    queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn new() -> Self {
        Self {
            outcomes: DashMap::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queue hits for the next query, whatever it is.
    pub fn push_hits(&self, hits: Vec<SearchHit>) {
        self.push(ANY_QUERY, Ok(hits));
    }

    /// Queue hits for one exact query string.
    pub fn push_hits_for(&self, query: impl Into<String>, hits: Vec<SearchHit>) {
        self.push(query, Ok(hits));
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        self.push(ANY_QUERY, Err(ProviderFailure::new("stub", reason)));
    }

    fn push(&self, key: impl Into<String>, outcome: Outcome) {
        self.outcomes
            .entry(key.into())
            .or_default()
            .push_back(outcome);
    }

    /// Queries received so far, oldest first.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|queries| queries.clone())
            .unwrap_or_default()
    }

    fn next_outcome(&self, key: &str) -> Option<Outcome> {
        self.outcomes
            .get_mut(key)
            .and_then(|mut queue| queue.pop_front())
    }
}

impl Default for StubSearch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolCapability for StubSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderFailure> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        self.next_outcome(query)
            .or_else(|| self.next_outcome(ANY_QUERY))
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drains_queue_then_returns_empty() {
        let stub = StubSearch::new();
        stub.push_hits(vec![SearchHit::new("a", "s1")]);
        stub.push_failure("offline");

        assert_eq!(stub.search("q1").await.unwrap().len(), 1);
        assert!(stub.search("q2").await.is_err());
        assert!(stub.search("q3").await.unwrap().is_empty());
        assert_eq!(stub.queries(), vec!["q1", "q2", "q3"]);
    }

    #[tokio::test]
    async fn exact_query_takes_precedence() {
        let stub = StubSearch::new();
        stub.push_hits(vec![SearchHit::new("generic", "s1")]);
        stub.push_hits_for("ti:surface", vec![SearchHit::new("specific", "s2")]);

        assert_eq!(stub.search("ti:surface").await.unwrap()[0].text, "specific");
        assert_eq!(stub.search("ti:surface").await.unwrap()[0].text, "generic");
    }
}
