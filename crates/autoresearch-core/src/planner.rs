//! Topic decomposition.
//!
//! The planner asks the language capability once for an ordered list of
//! subtopics. Anything other than a non-empty, parsable list is fatal for the
//! run: without subtopics the workflow has nothing to iterate over.

use tracing::{debug, info, instrument};

use crate::error::ResearchError;
use crate::llm::{DynLanguage, ExpectedShape, parse_list};
use crate::prompts;

/// Upper bound on subtopics kept from a single plan.
pub const DEFAULT_MAX_SUBTOPICS: usize = 5;

/// Planner that decomposes a topic into ordered subtopics
pub struct Planner {
    language: DynLanguage,
    max_subtopics: usize,
}

impl Planner {
    pub fn new(language: DynLanguage) -> Self {
        Self {
            language,
            max_subtopics: DEFAULT_MAX_SUBTOPICS,
        }
    }

    pub fn with_max_subtopics(mut self, max_subtopics: usize) -> Self {
        self.max_subtopics = max_subtopics.max(1);
        self
    }

    /// Decompose a topic into 1..=max_subtopics distinct, non-empty subtopics.
    #[instrument(name = "node.planner", skip(self))]
    pub async fn plan(&self, topic: &str) -> Result<Vec<String>, ResearchError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ResearchError::Decomposition("topic is empty".into()));
        }

        let raw = self
            .language
            .generate(&prompts::plan(topic, self.max_subtopics), ExpectedShape::List)
            .await
            .map_err(|err| ResearchError::Decomposition(err.to_string()))?;

        let mut subtopics = parse_list(&raw).ok_or_else(|| {
            ResearchError::Decomposition(format!("no subtopics in planner output: {raw:?}"))
        })?;

        if subtopics.len() > self.max_subtopics {
            debug!(
                returned = subtopics.len(),
                kept = self.max_subtopics,
                "truncating plan"
            );
            subtopics.truncate(self.max_subtopics);
        }

        info!(count = subtopics.len(), subtopics = ?subtopics, "topic decomposed");
        Ok(subtopics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::CannedLanguage;
    use std::sync::Arc;

    #[tokio::test]
    async fn planner_returns_ordered_distinct_subtopics() {
        let llm = Arc::new(CannedLanguage::new([
            r#"["surface codes", "fault tolerance thresholds", "Surface Codes"]"#,
        ]));
        let planner = Planner::new(llm.clone());

        let subtopics = planner.plan("quantum error correction").await.unwrap();
        assert_eq!(subtopics, vec!["surface codes", "fault tolerance thresholds"]);
        assert_eq!(llm.calls(), 1);
        assert_eq!(llm.prompts.lock().unwrap()[0].1, ExpectedShape::List);
    }

    #[tokio::test]
    async fn empty_plan_is_decomposition_error() {
        let planner = Planner::new(Arc::new(CannedLanguage::new(["[]"])));
        let err = planner.plan("quantum error correction").await.unwrap_err();
        assert!(matches!(err, ResearchError::Decomposition(_)));
    }

    #[tokio::test]
    async fn capability_failure_is_decomposition_error() {
        let planner = Planner::new(Arc::new(CannedLanguage::failing("model offline")));
        let err = planner.plan("quantum error correction").await.unwrap_err();
        assert!(matches!(err, ResearchError::Decomposition(ref reason) if reason.contains("model offline")));
    }

    #[tokio::test]
    async fn blank_topic_never_reaches_the_model() {
        let llm = Arc::new(CannedLanguage::new(["[\"a\"]"]));
        let planner = Planner::new(llm.clone());
        assert!(planner.plan("   ").await.is_err());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn chatty_plans_keep_only_numbered_items() {
        let llm = Arc::new(CannedLanguage::new([
            "Here are the subtopics:\n1. surface codes\n2. decoders",
        ]));
        let planner = Planner::new(llm);
        assert_eq!(
            planner.plan("quantum error correction").await.unwrap(),
            vec!["surface codes", "decoders"]
        );
    }

    #[tokio::test]
    async fn long_plans_are_truncated() {
        let llm = Arc::new(CannedLanguage::new(["a\nb\nc\nd"]));
        let planner = Planner::new(llm).with_max_subtopics(2);
        assert_eq!(planner.plan("topic").await.unwrap(), vec!["a", "b"]);
    }
}
