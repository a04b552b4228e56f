#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autoresearch_core::prompts::{
    ANALYST_ROLE, PLANNER_ROLE, QUERY_ROLE, REFINER_ROLE, ROUTER_ROLE, WRITER_ROLE,
};
use autoresearch_core::{
    Capabilities, ExpectedShape, GenerationFailure, LanguageCapability, ResearchEngine, SearchHit,
    StubSearch, ToolSet,
};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Planner,
    Router,
    Query,
    Analyst,
    Refiner,
    Writer,
}

impl Role {
    fn of(prompt: &str) -> Option<Self> {
        match prompt.lines().next()? {
            PLANNER_ROLE => Some(Role::Planner),
            ROUTER_ROLE => Some(Role::Router),
            QUERY_ROLE => Some(Role::Query),
            ANALYST_ROLE => Some(Role::Analyst),
            REFINER_ROLE => Some(Role::Refiner),
            WRITER_ROLE => Some(Role::Writer),
            _ => None,
        }
    }
}

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

impl Reply {
    fn into_result(self) -> Result<String, GenerationFailure> {
        match self {
            Reply::Text(text) => Ok(text),
            Reply::Fail(reason) => Err(GenerationFailure::new(reason, false)),
        }
    }
}

#[derive(Default)]
struct Script {
    queued: VecDeque<Reply>,
    fallback: Option<Reply>,
}

/// Language capability that answers by prompt role. Queued replies are used
/// first, then the role's standing reply.
pub struct ScriptedLanguage {
    scripts: Mutex<HashMap<Role, Script>>,
    prompts: Mutex<Vec<(Role, String)>>,
    cancel_on: Mutex<Option<(Role, CancellationToken)>>,
}

pub const SUFFICIENT: &str = r#"{"verdict": "sufficient", "reason": "covers the subtopic"}"#;
pub const INSUFFICIENT: &str = r#"{"verdict": "insufficient", "reason": "too thin"}"#;

impl ScriptedLanguage {
    pub fn new() -> Self {
        let language = Self {
            scripts: Mutex::new(HashMap::new()),
            prompts: Mutex::new(Vec::new()),
            cancel_on: Mutex::new(None),
        };
        language
            .always(
                Role::Planner,
                r#"["surface codes", "fault tolerance thresholds"]"#,
            )
            .always(Role::Router, "academic")
            .always(Role::Query, "ti:\"surface code\"")
            .always(Role::Analyst, SUFFICIENT)
            .always(Role::Refiner, "The results missed experiments.\nsurface code threshold experiments")
            .always(Role::Writer, "# Research Report\n\nFindings.")
    }

    pub fn always(self, role: Role, text: &str) -> Self {
        self.set_fallback(role, Reply::Text(text.to_string()));
        self
    }

    pub fn failing(self, role: Role, reason: &str) -> Self {
        self.set_fallback(role, Reply::Fail(reason.to_string()));
        self
    }

    fn set_fallback(&self, role: Role, reply: Reply) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts.entry(role).or_default().fallback = Some(reply);
    }

    pub fn then(self, role: Role, replies: &[&str]) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(role).or_default();
            script
                .queued
                .extend(replies.iter().map(|text| Reply::Text(text.to_string())));
        }
        self
    }

    pub fn cancel_on(self, role: Role, token: CancellationToken) -> Self {
        *self.cancel_on.lock().unwrap() = Some((role, token));
        self
    }

    pub fn calls(&self, role: Role) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .count()
    }

    pub fn prompts_for(&self, role: Role) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageCapability for ScriptedLanguage {
    async fn generate(
        &self,
        prompt: &str,
        _shape: ExpectedShape,
    ) -> Result<String, GenerationFailure> {
        let role = Role::of(prompt)
            .ok_or_else(|| GenerationFailure::new("prompt without a known role", false))?;
        self.prompts.lock().unwrap().push((role, prompt.to_string()));

        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *trigger == role {
                token.cancel();
            }
        }

        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(role).or_default();
            script.queued.pop_front().or_else(|| script.fallback.clone())
        };
        reply
            .unwrap_or_else(|| Reply::Fail("script exhausted".into()))
            .into_result()
    }
}

pub fn hits(prefix: &str, count: usize) -> Vec<SearchHit> {
    (0..count)
        .map(|i| {
            SearchHit::new(
                format!("{prefix} finding {i}"),
                format!("https://example.org/{prefix}/{i}"),
            )
        })
        .collect()
}

/// Engine plus handles to its scripted capabilities.
pub struct Harness {
    pub language: Arc<ScriptedLanguage>,
    pub web: Arc<StubSearch>,
    pub academic: Arc<StubSearch>,
    pub engine: ResearchEngine,
}

impl Harness {
    pub fn new(language: ScriptedLanguage) -> Self {
        let language = Arc::new(language);
        let web = Arc::new(StubSearch::new());
        let academic = Arc::new(StubSearch::new());
        let engine = ResearchEngine::new(Capabilities::new(
            language.clone(),
            ToolSet::new(web.clone(), academic.clone()),
        ));
        Self {
            language,
            web,
            academic,
            engine,
        }
    }
}
