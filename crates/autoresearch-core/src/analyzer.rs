//! Evidence analysis: decides between `rewrite`, `continue` and `write`.
//!
//! Order of checks:
//! 1. retry ceiling reached → `continue`, whatever the evidence looks like;
//! 2. evidence insufficient (empty, or judged so) → `rewrite`;
//! 3. more subtopics remain → `continue`;
//! 4. otherwise → `write`.
//!
//! A judgment that cannot be parsed counts as insufficient. Because the ceiling
//! is checked first, that can never loop forever.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::ResearchError;
use crate::evidence::EvidenceFragment;
use crate::llm::{DynLanguage, ExpectedShape, strip_code_fence};
use crate::prompts;
use crate::state::{Decision, RunState};

/// Sufficiency verdict for one subtopic's evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub sufficient: bool,
    pub reason: String,
}

impl Verdict {
    pub fn sufficient(reason: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            reason: reason.into(),
        }
    }

    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            reason: reason.into(),
        }
    }
}

/// Pluggable judgment of whether evidence is enough to write about a subtopic.
#[async_trait]
pub trait SufficiencyJudge: Send + Sync {
    async fn judge(
        &self,
        subtopic: &str,
        evidence: &[EvidenceFragment],
    ) -> Result<Verdict, ResearchError>;
}

pub type DynJudge = Arc<dyn SufficiencyJudge>;

/// Default judge: one structured-decision call to the language capability.
pub struct LanguageJudge {
    language: DynLanguage,
}

impl LanguageJudge {
    pub fn new(language: DynLanguage) -> Self {
        Self { language }
    }
}

#[derive(Deserialize)]
struct RawVerdict {
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    sufficient: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

/// Negations are checked before the bare keyword. Decision names only count
/// when they are the whole reply, since prose mentions them in either sense.
fn keyword_verdict(text: &str) -> Option<bool> {
    let text = text.to_lowercase();
    let bare = text.trim().trim_matches(|c: char| !c.is_alphanumeric());
    if text.contains("insufficient") || text.contains("not sufficient") {
        Some(false)
    } else if text.contains("sufficient") {
        Some(true)
    } else {
        match bare {
            "rewrite" => Some(false),
            "continue" | "write" => Some(true),
            _ => None,
        }
    }
}

/// Parse a judgment: a JSON object with `verdict` or `sufficient`, or a bare keyword.
pub fn parse_verdict(raw: &str) -> Option<Verdict> {
    let body = strip_code_fence(raw);
    if let Ok(parsed) = serde_json::from_str::<RawVerdict>(body) {
        let sufficient = parsed
            .sufficient
            .or_else(|| parsed.verdict.as_deref().and_then(keyword_verdict))?;
        return Some(Verdict {
            sufficient,
            reason: parsed.reason.unwrap_or_default(),
        });
    }
    keyword_verdict(body).map(|sufficient| Verdict {
        sufficient,
        reason: body.to_string(),
    })
}

#[async_trait]
impl SufficiencyJudge for LanguageJudge {
    async fn judge(
        &self,
        subtopic: &str,
        evidence: &[EvidenceFragment],
    ) -> Result<Verdict, ResearchError> {
        let raw = self
            .language
            .generate(
                &prompts::judge(subtopic, evidence),
                ExpectedShape::StructuredDecision,
            )
            .await
            .map_err(|err| ResearchError::Analysis(err.to_string()))?;

        parse_verdict(&raw)
            .ok_or_else(|| ResearchError::Analysis(format!("unparsable judgment {raw:?}")))
    }
}

/// Result of one analysis step.
#[derive(Debug)]
pub struct Analysis {
    pub decision: Decision,
    pub rationale: String,
    /// Judgment failure that was treated as "insufficient".
    pub degraded: Option<ResearchError>,
}

impl Analysis {
    fn new(decision: Decision, rationale: impl Into<String>) -> Self {
        Self {
            decision,
            rationale: rationale.into(),
            degraded: None,
        }
    }
}

pub struct Analyzer {
    judge: DynJudge,
}

impl Analyzer {
    pub fn new(judge: DynJudge) -> Self {
        Self { judge }
    }

    #[instrument(
        name = "node.analyzer",
        skip(self, state),
        fields(subtopic = state.current_subtopic(), attempt = state.attempt_count())
    )]
    pub async fn analyze(&self, state: &RunState) -> Analysis {
        if state.ceiling_reached() {
            warn!(
                max_attempts = state.max_attempts(),
                "retry ceiling reached; moving on"
            );
            return Analysis::new(Decision::Continue, "retry ceiling reached");
        }

        let subtopic = state.current_subtopic().unwrap_or_default();
        let evidence = state.evidence_for_current();

        let analysis = if evidence.is_empty() {
            Analysis::new(Decision::Rewrite, "no evidence gathered")
        } else {
            match self.judge.judge(subtopic, evidence).await {
                Ok(verdict) if !verdict.sufficient => {
                    Analysis::new(Decision::Rewrite, verdict.reason)
                }
                Ok(verdict) => Analysis::new(Self::next_step(state), verdict.reason),
                Err(err) => {
                    warn!(error = %err, "judgment unusable; treating evidence as insufficient");
                    Analysis {
                        decision: Decision::Rewrite,
                        rationale: "judgment unusable".to_string(),
                        degraded: Some(err),
                    }
                }
            }
        };

        debug!(decision = %analysis.decision, rationale = %analysis.rationale, "analysis complete");
        analysis
    }

    fn next_step(state: &RunState) -> Decision {
        if state.has_remaining_subtopics() {
            Decision::Continue
        } else {
            Decision::Write
        }
    }
}
