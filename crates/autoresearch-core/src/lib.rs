//! AutoResearch core: a self-correcting research workflow.
//!
//! A topic is decomposed into subtopics; each subtopic is routed to a search
//! tool, queried, analysed and, when the evidence is thin, refined and retried
//! up to a bounded number of attempts. Gathered evidence is then synthesised
//! into a single report. See [`ResearchEngine`] for the entry points.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod events;
pub mod evidence;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod planner;
pub mod prompts;
pub mod search;
pub mod security;
pub mod state;
pub mod tasks;
pub mod telemetry;
pub mod trace;
pub mod workflow;

pub use analyzer::{Analysis, Analyzer, DynJudge, LanguageJudge, SufficiencyJudge, Verdict};
pub use config::{Config, ConfigLoader, build_engine};
pub use error::{AbortedError, GenerationFailure, ProviderFailure, ResearchError};
pub use events::{Event, EventCollector, RunStatus};
pub use evidence::{EvidenceFragment, EvidenceStore};
pub use llm::{DynLanguage, ExpectedShape, LanguageCapability, OpenAiChat};
pub use logging::{SessionLogInput, log_session_completion, remove_session_logs};
pub use planner::Planner;
pub use search::{
    ArxivSearch, DynTool, SearchHit, StubSearch, TavilySearch, ToolCapability, ToolKind, ToolSet,
};
pub use security::{SecretValue, require_env};
pub use state::{DEFAULT_MAX_ATTEMPTS, Decision, RunState};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceStep, TraceSummary, persist_trace};
pub use workflow::{
    Capabilities, ResearchEngine, ResearchOptions, ResearchOutcome, WorkflowState,
};
