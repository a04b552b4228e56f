use tracing::{debug, info, instrument, warn};

use crate::error::ResearchError;
use crate::evidence::{EvidenceFragment, EvidenceStore};
use crate::llm::{DynLanguage, ExpectedShape, parse_category, strip_code_fence};
use crate::prompts;
use crate::search::{ToolKind, ToolSet};
use crate::state::RunState;

/// Tool used whenever routing output cannot be interpreted.
pub const DEFAULT_TOOL: ToolKind = ToolKind::WebSearch;

/// Picks a retrieval tool for the current subtopic.
pub struct Router {
    language: DynLanguage,
}

impl Router {
    pub fn new(language: DynLanguage) -> Self {
        Self { language }
    }

    #[instrument(name = "node.router", skip(self))]
    pub async fn route(
        &self,
        subtopic: &str,
        current_query: Option<&str>,
    ) -> Result<ToolKind, ResearchError> {
        let raw = self
            .language
            .generate(
                &prompts::route(subtopic, current_query),
                ExpectedShape::Category,
            )
            .await
            .map_err(|err| ResearchError::Routing(err.to_string()))?;

        let labels = ToolKind::ALL.map(|kind| kind.label());
        let tool = parse_category(&raw, &labels)
            .and_then(ToolKind::from_label)
            .ok_or_else(|| ResearchError::Routing(format!("unrecognised tool label {raw:?}")))?;

        debug!(%tool, "tool selected");
        Ok(tool)
    }
}

/// Renders a subtopic (plus optional refinement) into a tool-specific query.
pub struct QueryGenerator {
    language: DynLanguage,
}

impl QueryGenerator {
    pub fn new(language: DynLanguage) -> Self {
        Self { language }
    }

    #[instrument(name = "node.query", skip(self))]
    pub async fn generate(
        &self,
        subtopic: &str,
        tool: ToolKind,
        refinement: Option<&str>,
    ) -> Result<String, ResearchError> {
        let raw = self
            .language
            .generate(
                &prompts::query(subtopic, tool, refinement),
                ExpectedShape::FreeText,
            )
            .await
            .map_err(|err| ResearchError::Generation(err.to_string()))?;

        let query = first_line(strip_code_fence(&raw))
            .ok_or_else(|| ResearchError::Generation("empty query".into()))?;
        debug!(%query, "query generated");
        Ok(query)
    }
}

/// What one search step added to the evidence store.
#[derive(Debug)]
pub struct SearchReport {
    pub appended: usize,
    pub total: usize,
    /// Provider failure absorbed as an empty result.
    pub degraded: Option<ResearchError>,
}

/// Runs the selected tool and appends its results to the current subtopic.
pub struct SearchExecutor {
    tools: ToolSet,
}

impl SearchExecutor {
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    #[instrument(name = "node.search", skip(self, state), fields(subtopic = state.current_subtopic()))]
    pub async fn execute(&self, state: &mut RunState) -> SearchReport {
        let tool = state.selected_tool().unwrap_or(DEFAULT_TOOL);
        let query = state
            .current_query()
            .or(state.current_subtopic())
            .unwrap_or_default()
            .to_string();

        let (fragments, degraded) = match self.tools.get(tool).search(&query).await {
            Ok(hits) => (
                hits.into_iter()
                    .map(|hit| EvidenceFragment::from_hit(tool, hit))
                    .collect::<Vec<_>>(),
                None,
            ),
            Err(failure) => {
                warn!(%tool, %query, error = %failure, "search provider failed; treating as no results");
                (Vec::new(), Some(ResearchError::from(failure)))
            }
        };

        let appended = fragments.len();
        let total = state.append_evidence(fragments);
        info!(%tool, %query, appended, total, "search completed");

        SearchReport {
            appended,
            total,
            degraded,
        }
    }
}

/// Proposes a revised search intent after an insufficient result.
pub struct Refiner {
    language: DynLanguage,
}

impl Refiner {
    pub fn new(language: DynLanguage) -> Self {
        Self { language }
    }

    #[instrument(name = "node.refiner", skip(self, evidence))]
    pub async fn refine(
        &self,
        subtopic: &str,
        current_query: Option<&str>,
        evidence: &[EvidenceFragment],
    ) -> Result<String, ResearchError> {
        let raw = self
            .language
            .generate(
                &prompts::refine(subtopic, current_query, evidence),
                ExpectedShape::FreeText,
            )
            .await
            .map_err(|err| ResearchError::Generation(err.to_string()))?;

        let revised = last_line(strip_code_fence(&raw))
            .ok_or_else(|| ResearchError::Generation("empty refinement".into()))?;
        debug!(%revised, "query refined");
        Ok(revised)
    }
}

/// Synthesises the final report from all gathered evidence.
pub struct Writer {
    language: DynLanguage,
}

impl Writer {
    pub fn new(language: DynLanguage) -> Self {
        Self { language }
    }

    #[instrument(name = "node.writer", skip(self, evidence), fields(fragments = evidence.total()))]
    pub async fn write(&self, topic: &str, evidence: &EvidenceStore) -> Result<String, ResearchError> {
        let body = self
            .language
            .generate(&prompts::write(topic, evidence), ExpectedShape::FreeText)
            .await
            .map_err(|err| ResearchError::Synthesis(err.to_string()))?;

        let body = body.trim();
        if body.is_empty() {
            return Err(ResearchError::Synthesis("empty report".into()));
        }

        let report = format!("{body}\n\n{}", render_sources(evidence));
        info!(report_len = report.len(), "report written");
        Ok(report)
    }
}

fn render_sources(evidence: &EvidenceStore) -> String {
    let mut sections = vec!["## Sources".to_string()];
    for (subtopic, fragments) in evidence.iter() {
        let mut seen = std::collections::HashSet::new();
        let sources: Vec<String> = fragments
            .iter()
            .filter(|fragment| seen.insert(fragment.source.as_str()))
            .enumerate()
            .map(|(idx, fragment)| format!("  {}. {}", idx + 1, fragment.source))
            .collect();
        let listing = if sources.is_empty() {
            "  (none recorded)".to_string()
        } else {
            sources.join("\n")
        };
        sections.push(format!("### {subtopic}\n{listing}"));
    }
    sections.join("\n\n")
}

fn clean_line(line: &str) -> Option<String> {
    let cleaned = line
        .trim()
        .trim_matches(|c: char| c == '"' || c == '`' || c == '\'')
        .trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn first_line(text: &str) -> Option<String> {
    text.lines().find_map(clean_line)
}

fn last_line(text: &str) -> Option<String> {
    text.lines().rev().find_map(clean_line)
}
