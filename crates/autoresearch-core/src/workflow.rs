//! The research workflow as an explicit state machine.
//!
//! ```text
//! PLANNING → ROUTING → QUERYING → SEARCHING → ANALYZING ─┬─ rewrite  → REFINING  → ROUTING
//!                                                         ├─ continue → ADVANCING → ROUTING | WRITING
//!                                                         └─ write    → WRITING   → DONE
//! ```
//!
//! Every node runs to completion before the next transition is evaluated, and
//! cancellation is only observed between nodes. Each run owns its `RunState`,
//! so concurrent runs on one engine share nothing mutable.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analyzer::{Analyzer, DynJudge, LanguageJudge};
use crate::error::{AbortedError, ResearchError};
use crate::events::{Event, EventCollector, RunStatus};
use crate::evidence::EvidenceStore;
use crate::llm::DynLanguage;
use crate::logging::{SessionLogInput, log_session_completion};
use crate::metrics;
use crate::planner::Planner;
use crate::search::{ToolKind, ToolSet};
use crate::state::{DEFAULT_MAX_ATTEMPTS, Decision, RunState};
use crate::tasks::{DEFAULT_TOOL, QueryGenerator, Refiner, Router, SearchExecutor, Writer};
use crate::trace::persist_trace;

/// Engine states. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Planning,
    Routing,
    Querying,
    Searching,
    Analyzing,
    Refining,
    Advancing,
    Writing,
    Done,
    Aborted,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Planning => "planning",
            WorkflowState::Routing => "routing",
            WorkflowState::Querying => "querying",
            WorkflowState::Searching => "searching",
            WorkflowState::Analyzing => "analyzing",
            WorkflowState::Refining => "refining",
            WorkflowState::Advancing => "advancing",
            WorkflowState::Writing => "writing",
            WorkflowState::Done => "done",
            WorkflowState::Aborted => "aborted",
        }
    }

    /// Human-readable progress label. Searching is labelled per tool when known.
    pub fn label(&self, tool: Option<ToolKind>) -> &'static str {
        match (self, tool) {
            (WorkflowState::Planning, _) => "Planning research subtopics",
            (WorkflowState::Routing, _) => "Choosing the best tool",
            (WorkflowState::Querying, _) => "Writing the search query",
            (WorkflowState::Searching, Some(ToolKind::WebSearch)) => "Searching the web",
            (WorkflowState::Searching, Some(ToolKind::AcademicSearch)) => "Searching arXiv",
            (WorkflowState::Searching, None) => "Searching",
            (WorkflowState::Analyzing, _) => "Analysing search results",
            (WorkflowState::Refining, _) => "Refining the query",
            (WorkflowState::Advancing, _) => "Moving to the next subtopic",
            (WorkflowState::Writing, _) => "Writing the report",
            (WorkflowState::Done, _) => "Report complete",
            (WorkflowState::Aborted, _) => "Research aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Aborted)
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved external capabilities. The engine never sees raw configuration.
#[derive(Clone)]
pub struct Capabilities {
    pub language: DynLanguage,
    pub tools: ToolSet,
}

impl Capabilities {
    pub fn new(language: DynLanguage, tools: ToolSet) -> Self {
        Self { language, tools }
    }
}

/// Options for a single research run.
pub struct ResearchOptions<'a> {
    pub topic: &'a str,
    pub run_id: Option<String>,
    pub max_attempts: u32,
    pub events: Option<EventCollector>,
    pub cancel: CancellationToken,
    pub trace_dir: Option<PathBuf>,
    pub session_log: bool,
}

impl<'a> ResearchOptions<'a> {
    pub fn new(topic: &'a str) -> Self {
        Self {
            topic,
            run_id: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            events: None,
            cancel: CancellationToken::new(),
            trace_dir: None,
            session_log: false,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_events(mut self, events: EventCollector) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_trace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    pub fn with_session_log(mut self, enabled: bool) -> Self {
        self.session_log = enabled;
        self
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub run_id: String,
    pub report: String,
    pub subtopics: Vec<String>,
    pub evidence: EvidenceStore,
    pub analysis_steps: usize,
    pub trace_events: Vec<Event>,
    pub trace_path: Option<PathBuf>,
}

/// Per-run event sink: forwards to the caller's collector and keeps a local copy
/// for the trace. Event ids are numbered from zero within the run.
struct Progress {
    run_id: String,
    events: Option<EventCollector>,
    recorded: Vec<Event>,
    sequence: u64,
}

impl Progress {
    fn new(run_id: String, events: Option<EventCollector>) -> Self {
        Self {
            run_id,
            events,
            recorded: Vec::new(),
            sequence: 0,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    fn push(&mut self, event: Event) {
        if let Some(collector) = &self.events {
            collector.emit(event.clone());
        }
        self.recorded.push(event);
    }

    fn enter(&mut self, next: WorkflowState, state: &RunState) {
        debug!(
            state = %next,
            subtopic = state.current_subtopic(),
            attempt = state.attempt_count(),
            "transition"
        );
        let sequence = self.next_sequence();
        let event = Event::transition(
            &self.run_id,
            sequence,
            next,
            state.current_subtopic(),
            state.attempt_count(),
            state.selected_tool(),
        );
        self.push(event);
    }

    fn decision(&mut self, state: &RunState, decision: Decision) {
        metrics::record_decision(decision);
        let sequence = self.next_sequence();
        let event = Event::decision(
            &self.run_id,
            sequence,
            state.current_subtopic(),
            state.attempt_count(),
            decision,
        );
        self.push(event);
    }

    /// Record a node failure as a degraded step, or abort the run in `current`
    /// when the error is fatal.
    fn absorb(
        &mut self,
        current: WorkflowState,
        node: &str,
        err: ResearchError,
    ) -> Result<(), AbortedError> {
        if err.is_fatal() {
            return Err(AbortedError::new(current, err));
        }
        warn!(node, error = %err, "degraded step; continuing with safe default");
        metrics::record_degraded(node);
        let sequence = self.next_sequence();
        let event = Event::degraded(&self.run_id, sequence, node, err.to_string());
        self.push(event);
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) {
        let sequence = self.next_sequence();
        let event = Event::finished(&self.run_id, sequence, status);
        self.push(event);
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Orchestrates planner, router, query generator, search, analyzer, refiner and
/// writer over one `RunState` per run.
pub struct ResearchEngine {
    planner: Planner,
    router: Router,
    query: QueryGenerator,
    search: SearchExecutor,
    analyzer: Analyzer,
    refiner: Refiner,
    writer: Writer,
}

impl ResearchEngine {
    pub fn new(capabilities: Capabilities) -> Self {
        let Capabilities { language, tools } = capabilities;
        Self {
            planner: Planner::new(language.clone()),
            router: Router::new(language.clone()),
            query: QueryGenerator::new(language.clone()),
            search: SearchExecutor::new(tools),
            analyzer: Analyzer::new(std::sync::Arc::new(LanguageJudge::new(language.clone()))),
            refiner: Refiner::new(language.clone()),
            writer: Writer::new(language),
        }
    }

    /// Replace the default language-backed sufficiency judgment.
    pub fn with_judge(mut self, judge: DynJudge) -> Self {
        self.analyzer = Analyzer::new(judge);
        self
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    /// Run a topic end-to-end and return the report.
    pub async fn run(&self, topic: &str, max_attempts: u32) -> Result<String, AbortedError> {
        self.run_with_options(ResearchOptions::new(topic).with_max_attempts(max_attempts))
            .await
            .map(|outcome| outcome.report)
    }

    pub async fn run_with_options(
        &self,
        options: ResearchOptions<'_>,
    ) -> Result<ResearchOutcome, AbortedError> {
        let run_id = options.run_id.clone().unwrap_or_else(new_run_id);
        let started = Instant::now();
        let mut progress = Progress::new(run_id.clone(), options.events.clone());
        let mut state = RunState::new(run_id.clone(), options.topic.trim(), options.max_attempts);

        info!(%run_id, topic = %state.topic(), max_attempts = options.max_attempts, "research run started");

        let result = if options.max_attempts == 0 {
            Err(AbortedError::new(
                WorkflowState::Planning,
                ResearchError::InvalidConfiguration("max_attempts must be at least 1".into()),
            ))
        } else {
            self.drive(&mut state, &mut progress, &options.cancel).await
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                progress.finish(RunStatus::Completed);
                metrics::record_run(RunStatus::Completed.as_str(), duration_ms, state.subtopics().len());
                info!(%run_id, duration_ms, analysis_steps = state.analysis_steps(), "research run completed");

                let trace_path = options.trace_dir.as_ref().and_then(|dir| {
                    persist_trace(dir, &run_id, &progress.recorded)
                        .map_err(|err| warn!(error = %err, "failed to persist trace"))
                        .ok()
                });

                if options.session_log {
                    let input = SessionLogInput {
                        run_id: run_id.clone(),
                        topic: state.topic().to_string(),
                        subtopics: state.subtopics().to_vec(),
                        report: report.clone(),
                        sources: state.evidence().sources(),
                        trace_path: trace_path.as_ref().map(|p| p.display().to_string()),
                    };
                    if let Err(err) = log_session_completion(input) {
                        warn!(error = %err, "failed to write session log");
                    }
                }

                let subtopics = state.subtopics().to_vec();
                let analysis_steps = state.analysis_steps();
                Ok(ResearchOutcome {
                    run_id,
                    report,
                    subtopics,
                    evidence: state.into_evidence(),
                    analysis_steps,
                    trace_events: progress.recorded,
                    trace_path,
                })
            }
            Err(aborted) => {
                progress.enter(WorkflowState::Aborted, &state);
                progress.finish(RunStatus::Aborted {
                    reason: aborted.to_string(),
                });
                metrics::record_run("aborted", duration_ms, state.subtopics().len());
                error!(%run_id, error = %aborted, "research run aborted");
                Err(aborted)
            }
        }
    }

    async fn drive(
        &self,
        state: &mut RunState,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<String, AbortedError> {
        let mut current = WorkflowState::Planning;
        let mut report: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(AbortedError::new(current, ResearchError::Cancelled));
            }
            state
                .check_invariants()
                .map_err(|err| AbortedError::new(current, err))?;
            progress.enter(current, state);

            current = match current {
                WorkflowState::Planning => {
                    let subtopics = self
                        .planner
                        .plan(state.topic())
                        .await
                        .map_err(|err| AbortedError::new(current, err))?;
                    state.set_subtopics(subtopics);
                    WorkflowState::Routing
                }
                WorkflowState::Routing => match state.current_subtopic().map(str::to_string) {
                    // cursor already past the end; nothing left to route
                    None => WorkflowState::Writing,
                    Some(subtopic) => {
                        let tool = match self.router.route(&subtopic, state.current_query()).await {
                            Ok(tool) => tool,
                            Err(err) => {
                                progress.absorb(current, "router", err)?;
                                DEFAULT_TOOL
                            }
                        };
                        state.select_tool(tool);
                        WorkflowState::Querying
                    }
                },
                WorkflowState::Querying => {
                    let subtopic = state.current_subtopic().unwrap_or_default().to_string();
                    let tool = state.selected_tool().unwrap_or(DEFAULT_TOOL);
                    match self.query.generate(&subtopic, tool, state.refinement()).await {
                        Ok(query) => {
                            state.set_query(query);
                            WorkflowState::Searching
                        }
                        Err(err) => {
                            progress.absorb(current, "query", err)?;
                            WorkflowState::Analyzing
                        }
                    }
                }
                WorkflowState::Searching => {
                    let outcome = self.search.execute(state).await;
                    if let Some(err) = outcome.degraded {
                        progress.absorb(current, "search", err)?;
                    }
                    WorkflowState::Analyzing
                }
                WorkflowState::Analyzing => {
                    let analysis = self.analyzer.analyze(state).await;
                    if let Some(err) = analysis.degraded {
                        progress.absorb(current, "analyzer", err)?;
                    }
                    state.set_decision(analysis.decision);
                    progress.decision(state, analysis.decision);
                    match analysis.decision {
                        Decision::Rewrite => WorkflowState::Refining,
                        Decision::Continue => WorkflowState::Advancing,
                        Decision::Write => WorkflowState::Writing,
                    }
                }
                WorkflowState::Refining => {
                    let subtopic = state.current_subtopic().unwrap_or_default().to_string();
                    let revised = match self
                        .refiner
                        .refine(&subtopic, state.current_query(), state.evidence_for_current())
                        .await
                    {
                        Ok(revised) => revised,
                        Err(err) => {
                            progress.absorb(current, "refiner", err)?;
                            subtopic
                        }
                    };
                    state
                        .record_rewrite(revised)
                        .map_err(|err| AbortedError::new(current, err))?;
                    WorkflowState::Routing
                }
                WorkflowState::Advancing => {
                    state.advance();
                    if state.is_exhausted() {
                        WorkflowState::Writing
                    } else {
                        WorkflowState::Routing
                    }
                }
                WorkflowState::Writing => {
                    let text = self
                        .writer
                        .write(state.topic(), state.evidence())
                        .await
                        .map_err(|err| AbortedError::new(current, err))?;
                    report = Some(text);
                    WorkflowState::Done
                }
                WorkflowState::Done => {
                    return report.take().ok_or_else(|| {
                        AbortedError::new(
                            current,
                            ResearchError::Synthesis("reached done without a report".into()),
                        )
                    });
                }
                WorkflowState::Aborted => {
                    return Err(AbortedError::new(
                        current,
                        ResearchError::Other(anyhow::anyhow!("aborted state entered")),
                    ));
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_tools() {
        assert_eq!(
            WorkflowState::Searching.label(Some(ToolKind::AcademicSearch)),
            "Searching arXiv"
        );
        assert_eq!(
            WorkflowState::Searching.label(Some(ToolKind::WebSearch)),
            "Searching the web"
        );
        assert_eq!(WorkflowState::Done.label(None), "Report complete");
    }

    #[test]
    fn terminal_states() {
        assert!(WorkflowState::Done.is_terminal());
        assert!(WorkflowState::Aborted.is_terminal());
        assert!(!WorkflowState::Refining.is_terminal());
    }

    #[test]
    fn options_builder_defaults() {
        let options = ResearchOptions::new("topic");
        assert_eq!(options.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(options.run_id.is_none());
        assert!(!options.cancel.is_cancelled());
        assert!(!options.session_log);

        let options = options.with_max_attempts(5).with_run_id("abc");
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.run_id.as_deref(), Some("abc"));
    }

    #[test]
    fn fatal_errors_are_never_absorbed() {
        let mut progress = Progress::new("run".into(), None);
        let err = progress
            .absorb(WorkflowState::Routing, "router", ResearchError::Cancelled)
            .unwrap_err();
        assert_eq!(err.state, WorkflowState::Routing);
        assert!(matches!(err.cause, ResearchError::Cancelled));
        assert!(progress.recorded.is_empty());

        progress
            .absorb(
                WorkflowState::Searching,
                "search",
                ResearchError::Provider("timeout".into()),
            )
            .unwrap();
        assert!(matches!(
            progress.recorded.as_slice(),
            [Event::Degraded { node, .. }] if node == "search"
        ));
    }

    #[test]
    fn event_ids_count_per_run() {
        let state = RunState::new("a", "topic", 3);
        let mut first = Progress::new("a".into(), None);
        let mut second = Progress::new("b".into(), None);
        first.enter(WorkflowState::Planning, &state);
        second.enter(WorkflowState::Planning, &state);
        first.finish(RunStatus::Completed);

        let ids: Vec<&str> = first.recorded.iter().map(Event::event_id).collect();
        assert_eq!(ids, vec!["evt_0", "evt_1"]);
        assert_eq!(second.recorded[0].event_id(), "evt_0");
    }
}
