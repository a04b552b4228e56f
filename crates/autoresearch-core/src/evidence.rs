use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::search::{SearchHit, ToolKind};

/// A single retrieved snippet plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFragment {
    pub tool: ToolKind,
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub relevance: Option<f32>,
}

impl EvidenceFragment {
    pub fn from_hit(tool: ToolKind, hit: SearchHit) -> Self {
        Self {
            tool,
            text: hit.text,
            source: hit.source,
            relevance: hit.relevance,
        }
    }
}

/// Append-only accumulator of evidence keyed by subtopic.
///
/// Subtopics keep their first-seen order; fragments are only ever appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceStore {
    order: Vec<String>,
    fragments: HashMap<String, Vec<EvidenceFragment>>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append fragments for a subtopic and return how many are now stored for it.
    pub fn append<I>(&mut self, subtopic: &str, fragments: I) -> usize
    where
        I: IntoIterator<Item = EvidenceFragment>,
    {
        if !self.fragments.contains_key(subtopic) {
            self.order.push(subtopic.to_string());
        }
        let entry = self.fragments.entry(subtopic.to_string()).or_default();
        entry.extend(fragments);
        entry.len()
    }

    pub fn for_subtopic(&self, subtopic: &str) -> &[EvidenceFragment] {
        self.fragments
            .get(subtopic)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, subtopic: &str) -> usize {
        self.for_subtopic(subtopic).len()
    }

    /// Subtopics in the order they first received evidence (or were registered).
    pub fn subtopics(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EvidenceFragment])> {
        self.order
            .iter()
            .map(|subtopic| (subtopic.as_str(), self.for_subtopic(subtopic)))
    }

    /// Distinct sources across all subtopics, first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.iter()
            .flat_map(|(_, fragments)| fragments.iter())
            .filter(|fragment| seen.insert(fragment.source.clone()))
            .map(|fragment| fragment.source.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.fragments.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, source: &str) -> EvidenceFragment {
        EvidenceFragment::from_hit(ToolKind::WebSearch, SearchHit::new(text, source))
    }

    #[test]
    fn appends_never_replace() {
        let mut store = EvidenceStore::new();
        assert_eq!(store.append("decoders", vec![fragment("a", "s1")]), 1);
        assert_eq!(store.append("decoders", Vec::new()), 1);
        assert_eq!(
            store.append("decoders", vec![fragment("b", "s2"), fragment("c", "s1")]),
            3
        );

        let texts: Vec<_> = store
            .for_subtopic("decoders")
            .iter()
            .map(|f| f.text.as_str())
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(store.sources(), vec!["s1", "s2"]);
    }

    #[test]
    fn keeps_subtopic_order_including_empty_ones() {
        let mut store = EvidenceStore::new();
        store.append("second", Vec::new());
        store.append("first", vec![fragment("x", "s")]);

        assert_eq!(store.subtopics().collect::<Vec<_>>(), vec!["second", "first"]);
        assert_eq!(store.count("second"), 0);
        assert_eq!(store.count("unknown"), 0);
        assert_eq!(store.total(), 1);
    }
}
