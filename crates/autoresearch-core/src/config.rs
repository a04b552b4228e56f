use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;
use tracing::debug;

use crate::error::ResearchError;
use crate::llm::{DEFAULT_OPENAI_BASE_URL, OpenAiChat};
use crate::planner::{DEFAULT_MAX_SUBTOPICS, Planner};
use crate::search::{ArxivSearch, DEFAULT_ARXIV_ENDPOINT, DEFAULT_TAVILY_ENDPOINT, TavilySearch, ToolSet};
use crate::security::{SecretValue, require_env};
use crate::state::DEFAULT_MAX_ATTEMPTS;
use crate::workflow::{Capabilities, ResearchEngine};

const DEFAULT_CONFIG_PATH: &str = "autoresearch.toml";
pub const CONFIG_PATH_ENV: &str = "AUTORESEARCH_CONFIG";

/// Top-level configuration. Every section is optional in the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the configured LLM secret value (from environment only).
    pub fn llm_api_key(&self) -> Result<SecretValue, ResearchError> {
        require_env(&self.llm.api_key_env)
    }

    pub fn web_api_key(&self) -> Result<SecretValue, ResearchError> {
        require_env(&self.search.web_api_key_env)
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `AUTORESEARCH_CONFIG` environment variable.
    /// 3. `autoresearch.toml` in the current working directory, or built-in
    ///    defaults when that file does not exist.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ResearchError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            debug!(path = %candidate.display(), "no config file; using defaults");
            let config = Config::default();
            Self::validate(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| ResearchError::config_io(candidate.clone(), err))?;
        let config = Self::parse(&raw)?;
        debug!(path = %candidate.display(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Config, ResearchError> {
        let config: Config = toml::from_str(raw)
            .map_err(|err| ResearchError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ResearchError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(ResearchError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.search.web_api_key_env.trim().is_empty() {
            return Err(ResearchError::InvalidConfiguration(
                "search.web_api_key_env must reference an environment variable".into(),
            ));
        }
        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(ResearchError::InvalidConfiguration(format!(
                "llm.temperature must be within 0..=2, got {}",
                config.llm.temperature
            )));
        }
        if config.workflow.max_attempts == 0 {
            return Err(ResearchError::InvalidConfiguration(
                "workflow.max_attempts must be at least 1".into(),
            ));
        }
        if config.workflow.max_subtopics == 0 {
            return Err(ResearchError::InvalidConfiguration(
                "workflow.max_subtopics must be at least 1".into(),
            ));
        }
        if config.search.max_results == 0 {
            return Err(ResearchError::InvalidConfiguration(
                "search.max_results must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub base_url: String,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            base_url: DEFAULT_OPENAI_BASE_URL.into(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub web_api_key_env: String,
    pub web_endpoint: String,
    pub academic_endpoint: String,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            web_api_key_env: "TAVILY_API_KEY".into(),
            web_endpoint: DEFAULT_TAVILY_ENDPOINT.into(),
            academic_endpoint: DEFAULT_ARXIV_ENDPOINT.into(),
            max_results: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_attempts: u32,
    pub max_subtopics: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_subtopics: DEFAULT_MAX_SUBTOPICS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

impl Capabilities {
    /// Build the production adapters described by `config`. Secrets are read
    /// from the environment here and nowhere else.
    pub fn from_config(config: &Config) -> Result<Self, ResearchError> {
        if !config.llm.provider.eq_ignore_ascii_case("openai") {
            return Err(ResearchError::InvalidConfiguration(format!(
                "unsupported llm.provider {:?}",
                config.llm.provider
            )));
        }

        let language = OpenAiChat::new(config.llm_api_key()?, config.llm.model.clone())
            .with_base_url(config.llm.base_url.clone())
            .with_temperature(config.llm.temperature);
        let web = TavilySearch::new(config.web_api_key()?)
            .with_endpoint(config.search.web_endpoint.clone())
            .with_max_results(config.search.max_results);
        let academic = ArxivSearch::new()
            .with_endpoint(config.search.academic_endpoint.clone())
            .with_max_results(config.search.max_results);

        Ok(Capabilities::new(
            Arc::new(language),
            ToolSet::new(Arc::new(web), Arc::new(academic)),
        ))
    }
}

/// Engine wired with production adapters and the configured planner bound.
pub fn build_engine(config: &Config) -> Result<ResearchEngine, ResearchError> {
    let capabilities = Capabilities::from_config(config)?;
    let planner = Planner::new(capabilities.language.clone())
        .with_max_subtopics(config.workflow.max_subtopics);
    Ok(ResearchEngine::new(capabilities).with_planner(planner))
}
