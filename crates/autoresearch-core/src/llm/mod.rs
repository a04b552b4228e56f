//! Language capability: the single prompt → text seam used by every decision node.

pub mod openai;
pub use openai::{DEFAULT_OPENAI_BASE_URL, OpenAiChat};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationFailure;

/// Shape of output a node expects back from the language capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedShape {
    FreeText,
    List,
    Category,
    StructuredDecision,
}

impl ExpectedShape {
    /// Formatting instruction adapters may send alongside the prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            ExpectedShape::FreeText => "Respond in well-structured prose.",
            ExpectedShape::List => {
                "Respond only with a JSON array of strings. Do not add commentary."
            }
            ExpectedShape::Category => {
                "Respond with exactly one of the allowed labels and nothing else."
            }
            ExpectedShape::StructuredDecision => {
                "Respond only with a single JSON object matching the requested fields."
            }
        }
    }
}

#[async_trait]
pub trait LanguageCapability: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        shape: ExpectedShape,
    ) -> Result<String, GenerationFailure>;
}

pub type DynLanguage = Arc<dyn LanguageCapability>;

/// Parse list-shaped output: a JSON array of strings, or one item per line with
/// optional bullets or numbering. Empty items and duplicates are dropped.
///
/// In line mode, once any line carries a bullet or number only marked lines are
/// items, and lines ending in `:` are headings, never items.
///
/// Returns `None` when nothing list-like can be recovered.
pub fn parse_list(raw: &str) -> Option<Vec<String>> {
    let body = strip_code_fence(raw);

    let items: Vec<String> = if body.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<String>>(body.trim()).ok()?
    } else {
        let lines: Vec<(bool, &str)> = body
            .lines()
            .map(split_list_marker)
            .filter(|(_, line)| !line.ends_with(':'))
            .collect();
        let any_marked = lines.iter().any(|(marked, _)| *marked);
        lines
            .into_iter()
            .filter(|(marked, _)| *marked || !any_marked)
            .map(|(_, line)| line.to_string())
            .collect()
    };

    let mut seen = std::collections::HashSet::new();
    let cleaned: Vec<String> = items
        .into_iter()
        .map(|item| item.trim().trim_matches('"').trim().to_string())
        .filter(|item| !item.is_empty())
        .filter(|item| seen.insert(item.to_lowercase()))
        .collect();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Match category-shaped output against a fixed label set (case-insensitive).
///
/// An exact match wins; otherwise the output must mention exactly one label.
pub fn parse_category<'a>(raw: &str, labels: &[&'a str]) -> Option<&'a str> {
    let normalized = raw
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();

    if let Some(label) = labels
        .iter()
        .copied()
        .find(|label| label.eq_ignore_ascii_case(&normalized))
    {
        return Some(label);
    }

    let mut mentioned = labels
        .iter()
        .copied()
        .filter(|label| normalized.contains(&label.to_lowercase()));
    match (mentioned.next(), mentioned.next()) {
        (Some(label), None) => Some(label),
        _ => None,
    }
}

/// Remove a surrounding Markdown code fence if the model added one.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Split a leading bullet or `1.`/`1)` marker off a line.
fn split_list_marker(line: &str) -> (bool, &str) {
    let line = line.trim();
    if let Some(rest) = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "))
    {
        return (true, rest.trim());
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return (true, stripped.trim());
        }
    }
    (false, line)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays canned responses in order; records every prompt it sees.
    pub(crate) struct CannedLanguage {
        responses: Mutex<VecDeque<Result<String, GenerationFailure>>>,
        pub(crate) prompts: Mutex<Vec<(String, ExpectedShape)>>,
    }

    impl CannedLanguage {
        pub(crate) fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing(reason: &str) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from([Err(GenerationFailure::new(
                    reason, false,
                ))])),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageCapability for CannedLanguage {
        async fn generate(
            &self,
            prompt: &str,
            shape: ExpectedShape,
        ) -> Result<String, GenerationFailure> {
            self.prompts.lock().unwrap().push((prompt.to_string(), shape));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationFailure::new("script exhausted", false)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_inside_fence() {
        let raw = "```json\n[\"surface codes\", \"fault tolerance thresholds\"]\n```";
        assert_eq!(
            parse_list(raw).unwrap(),
            vec!["surface codes", "fault tolerance thresholds"]
        );
    }

    #[test]
    fn parses_numbered_lines_and_drops_duplicates() {
        let raw = "1. Surface codes\n2) Decoders\n- surface codes\n\n* Magic states";
        assert_eq!(
            parse_list(raw).unwrap(),
            vec!["Surface codes", "Decoders", "Magic states"]
        );
    }

    #[test]
    fn preamble_around_numbered_items_is_dropped() {
        let raw = "Here are the subtopics:\n1. surface codes\n2. decoders\nLet me know if you need more.";
        assert_eq!(parse_list(raw).unwrap(), vec!["surface codes", "decoders"]);
    }

    #[test]
    fn unmarked_lines_are_items_unless_headings() {
        assert_eq!(
            parse_list("Subtopics:\nsurface codes\ndecoders").unwrap(),
            vec!["surface codes", "decoders"]
        );
    }

    #[test]
    fn empty_list_is_none() {
        assert!(parse_list("[]").is_none());
        assert!(parse_list("   \n  ").is_none());
        assert!(parse_list("[not json").is_none());
    }

    #[test]
    fn category_matching() {
        let labels = ["web", "academic"];
        assert_eq!(parse_category(" Academic. ", &labels), Some("academic"));
        assert_eq!(
            parse_category("I would pick web for this", &labels),
            Some("web")
        );
        assert_eq!(parse_category("web or academic", &labels), None);
        assert_eq!(parse_category("unsure", &labels), None);
    }
}
