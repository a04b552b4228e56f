//! Per-run mutable state, owned by the workflow engine for one research session.

use serde::{Deserialize, Serialize};

use crate::error::ResearchError;
use crate::evidence::{EvidenceFragment, EvidenceStore};
use crate::search::ToolKind;

/// Default retry ceiling per subtopic.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Analyzer verdict for the current subtopic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Evidence insufficient; refine the query and try again
    Rewrite,
    /// Move on to the next subtopic
    Continue,
    /// Evidence sufficient and nothing left; synthesise the report
    Write,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Rewrite => "rewrite",
            Decision::Continue => "continue",
            Decision::Write => "write",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    run_id: String,
    topic: String,
    subtopics: Vec<String>,
    cursor: usize,
    current_query: Option<String>,
    refinement: Option<String>,
    attempt_count: u32,
    max_attempts: u32,
    evidence: EvidenceStore,
    selected_tool: Option<ToolKind>,
    decision: Option<Decision>,
    analysis_steps: usize,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, topic: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            run_id: run_id.into(),
            topic: topic.into(),
            subtopics: Vec::new(),
            cursor: 0,
            current_query: None,
            refinement: None,
            attempt_count: 0,
            max_attempts,
            evidence: EvidenceStore::new(),
            selected_tool: None,
            decision: None,
            analysis_steps: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn subtopics(&self) -> &[String] {
        &self.subtopics
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_query(&self) -> Option<&str> {
        self.current_query.as_deref()
    }

    /// Hint left by the refiner for the next query generation, if on a rewrite cycle.
    pub fn refinement(&self) -> Option<&str> {
        self.refinement.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn evidence(&self) -> &EvidenceStore {
        &self.evidence
    }

    pub fn selected_tool(&self) -> Option<ToolKind> {
        self.selected_tool
    }

    pub fn decision(&self) -> Option<Decision> {
        self.decision
    }

    pub fn analysis_steps(&self) -> usize {
        self.analysis_steps
    }

    pub fn current_subtopic(&self) -> Option<&str> {
        self.subtopics.get(self.cursor).map(String::as_str)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.subtopics.len()
    }

    /// Whether any subtopic follows the one at the cursor.
    pub fn has_remaining_subtopics(&self) -> bool {
        self.cursor + 1 < self.subtopics.len()
    }

    pub fn ceiling_reached(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    pub fn evidence_for_current(&self) -> &[EvidenceFragment] {
        match self.current_subtopic() {
            Some(subtopic) => self.evidence.for_subtopic(subtopic),
            None => &[],
        }
    }

    pub fn into_evidence(self) -> EvidenceStore {
        self.evidence
    }

    /// Install the planner's subtopics. Only the first call has any effect.
    pub(crate) fn set_subtopics(&mut self, subtopics: Vec<String>) {
        if !self.subtopics.is_empty() {
            return;
        }
        for subtopic in &subtopics {
            self.evidence.append(subtopic, Vec::new());
        }
        self.subtopics = subtopics;
    }

    pub(crate) fn select_tool(&mut self, tool: ToolKind) {
        self.selected_tool = Some(tool);
    }

    pub(crate) fn set_query(&mut self, query: impl Into<String>) {
        self.current_query = Some(query.into());
    }

    pub(crate) fn set_decision(&mut self, decision: Decision) {
        self.decision = Some(decision);
        self.analysis_steps += 1;
    }

    /// Append fragments to the current subtopic; returns the new fragment count.
    pub(crate) fn append_evidence(&mut self, fragments: Vec<EvidenceFragment>) -> usize {
        let Some(subtopic) = self.subtopics.get(self.cursor).cloned() else {
            return 0;
        };
        self.evidence.append(&subtopic, fragments)
    }

    /// Record a refinement. Refuses to move past the retry ceiling.
    pub(crate) fn record_rewrite(&mut self, revised: String) -> Result<u32, ResearchError> {
        if self.ceiling_reached() {
            return Err(ResearchError::RetryCeiling {
                attempt: self.attempt_count + 1,
                limit: self.max_attempts,
            });
        }
        self.attempt_count += 1;
        self.current_query = Some(revised.clone());
        self.refinement = Some(revised);
        Ok(self.attempt_count)
    }

    /// Move to the next subtopic, clearing per-subtopic state.
    pub(crate) fn advance(&mut self) {
        self.cursor = (self.cursor + 1).min(self.subtopics.len());
        self.attempt_count = 0;
        self.current_query = None;
        self.refinement = None;
        self.selected_tool = None;
    }

    /// Guard for the engine: attempts above the ceiling mean the loop logic is broken.
    pub(crate) fn check_invariants(&self) -> Result<(), ResearchError> {
        if self.attempt_count > self.max_attempts {
            return Err(ResearchError::RetryCeiling {
                attempt: self.attempt_count,
                limit: self.max_attempts,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchHit;

    fn planned(max_attempts: u32) -> RunState {
        let mut state = RunState::new("run-1", "quantum error correction", max_attempts);
        state.set_subtopics(vec!["surface codes".into(), "thresholds".into()]);
        state
    }

    #[test]
    fn advance_resets_attempts_and_moves_one_step() {
        let mut state = planned(3);
        state.set_query("ti:surface");
        state.record_rewrite("surface code decoders".into()).unwrap();
        assert_eq!(state.attempt_count(), 1);

        state.advance();
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.attempt_count(), 0);
        assert!(state.current_query().is_none());
        assert!(state.refinement().is_none());
        assert!(!state.has_remaining_subtopics());

        state.advance();
        state.advance();
        assert_eq!(state.cursor(), 2);
        assert!(state.is_exhausted());
        assert!(state.current_subtopic().is_none());
    }

    #[test]
    fn rewrite_refused_at_ceiling() {
        let mut state = planned(2);
        state.record_rewrite("a".into()).unwrap();
        state.record_rewrite("b".into()).unwrap();
        assert!(state.ceiling_reached());

        let err = state.record_rewrite("c".into()).unwrap_err();
        assert!(matches!(err, ResearchError::RetryCeiling { limit: 2, .. }));
        assert_eq!(state.attempt_count(), 2);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn subtopics_install_once_and_register_evidence_slots() {
        let mut state = planned(3);
        state.set_subtopics(vec!["other".into()]);
        assert_eq!(state.subtopics().len(), 2);
        assert_eq!(
            state.evidence().subtopics().collect::<Vec<_>>(),
            vec!["surface codes", "thresholds"]
        );

        let count = state.append_evidence(vec![EvidenceFragment::from_hit(
            ToolKind::AcademicSearch,
            SearchHit::new("paper", "arxiv"),
        )]);
        assert_eq!(count, 1);
        assert_eq!(state.evidence_for_current().len(), 1);
    }
}
