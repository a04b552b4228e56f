//! Tool capability: opaque query → ranked snippets mapping, one adapter per variant.

pub mod arxiv;
pub mod stub;
pub mod tavily;

pub use arxiv::{ArxivSearch, DEFAULT_ARXIV_ENDPOINT};
pub use stub::StubSearch;
pub use tavily::{DEFAULT_TAVILY_ENDPOINT, TavilySearch};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderFailure;

/// Retrieval tool variants the router can choose between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// General web content
    WebSearch,
    /// Peer-reviewed and preprint literature
    AcademicSearch,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::WebSearch, ToolKind::AcademicSearch];

    /// Categorical label exchanged with the language capability.
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "web",
            ToolKind::AcademicSearch => "academic",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Query grammar hint handed to the query generator.
    pub fn query_style(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => {
                "a concise keyword-style web search query (no boolean operators)"
            }
            ToolKind::AcademicSearch => {
                "an arXiv API search_query using field prefixes such as ti:, abs:, au: and AND/OR"
            }
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One ranked result from a search tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    /// Provider-specific relevance signal, if any.
    #[serde(default)]
    pub relevance: Option<f32>,
}

impl SearchHit {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            relevance: None,
        }
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.relevance = Some(relevance);
        self
    }
}

#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Run a query. An empty vector means "no results", not an error.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderFailure>;
}

pub type DynTool = Arc<dyn ToolCapability>;

/// The resolved tool for every variant.
#[derive(Clone)]
pub struct ToolSet {
    web: DynTool,
    academic: DynTool,
}

impl ToolSet {
    pub fn new(web: DynTool, academic: DynTool) -> Self {
        Self { web, academic }
    }

    pub fn get(&self, kind: ToolKind) -> &DynTool {
        match kind {
            ToolKind::WebSearch => &self.web,
            ToolKind::AcademicSearch => &self.academic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(ToolKind::from_label(" Academic "), Some(ToolKind::AcademicSearch));
        assert_eq!(ToolKind::from_label("library"), None);
    }

    #[tokio::test]
    async fn tool_set_dispatches_by_kind() {
        let web = Arc::new(StubSearch::new());
        web.push_hits(vec![SearchHit::new("web snippet", "https://example.com")]);
        let academic = Arc::new(StubSearch::new());
        academic.push_hits(vec![SearchHit::new("paper", "http://arxiv.org/abs/1")]);
        let tools = ToolSet::new(web, academic);

        let hits = tools
            .get(ToolKind::AcademicSearch)
            .search("surface codes")
            .await
            .unwrap();
        assert_eq!(hits[0].text, "paper");
    }
}
