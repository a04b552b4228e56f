use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::workflow::WorkflowState;

/// Core error type for AutoResearch.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("decomposition failed: {0}")]
    Decomposition(String),
    #[error("routing failed: {0}")]
    Routing(String),
    #[error("query generation failed: {0}")]
    Generation(String),
    #[error("analysis failed: {0}")]
    Analysis(String),
    #[error("report synthesis failed: {0}")]
    Synthesis(String),
    #[error("search provider failed: {0}")]
    Provider(String),
    #[error("run cancelled")]
    Cancelled,
    #[error("retry ceiling violated: attempt {attempt} exceeds limit {limit}")]
    RetryCeiling { attempt: u32, limit: u32 },
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    /// Whether this error terminates a run. The engine aborts on fatal errors
    /// from any node and records everything else as a degraded step.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Routing(_) | Self::Generation(_) | Self::Analysis(_) | Self::Provider(_)
        )
    }
}

/// Failure reported by a language capability.
#[derive(Debug, Clone)]
pub struct GenerationFailure {
    pub reason: String,
    /// Advisory for callers. The engine never retries a call; it degrades or
    /// aborts, and the flag shows up in the recorded reason.
    pub retryable: bool,
}

impl GenerationFailure {
    pub fn new(reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason: reason.into(),
            retryable,
        }
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let retry = if self.retryable {
            "retryable"
        } else {
            "terminal"
        };
        write!(f, "{retry} generation failure: {}", self.reason)
    }
}

impl std::error::Error for GenerationFailure {}

/// Transport or authentication failure reported by a search tool.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} provider failure: {}", self.provider, self.reason)
    }
}

impl std::error::Error for ProviderFailure {}

impl From<ProviderFailure> for ResearchError {
    fn from(failure: ProviderFailure) -> Self {
        Self::Provider(failure.to_string())
    }
}

/// The single run-level failure: where the run stopped and why.
#[derive(Debug, Error)]
#[error("research run aborted during {state}: {cause}")]
pub struct AbortedError {
    pub state: WorkflowState,
    #[source]
    pub cause: ResearchError,
}

impl AbortedError {
    pub fn new(state: WorkflowState, cause: ResearchError) -> Self {
        Self { state, cause }
    }
}
