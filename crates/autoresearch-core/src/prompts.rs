//! Prompt templates for every node that consults the language capability.

use std::fmt::Write as _;

use crate::evidence::{EvidenceFragment, EvidenceStore};
use crate::search::ToolKind;

pub const PLANNER_ROLE: &str = "You are the research planner.";
pub const ROUTER_ROLE: &str = "You are the research router.";
pub const QUERY_ROLE: &str = "You are the search query writer.";
pub const ANALYST_ROLE: &str = "You are the evidence analyst.";
pub const REFINER_ROLE: &str = "You are the query refiner.";
pub const WRITER_ROLE: &str = "You are the report writer.";

/// Longest snippet (in characters) quoted back to the model.
const MAX_FRAGMENT_CHARS: usize = 1_200;

pub fn plan(topic: &str, max_subtopics: usize) -> String {
    format!(
        "{PLANNER_ROLE}\n\
         Break the research topic below into between 1 and {max_subtopics} distinct, \
         non-overlapping subtopics that together cover it. Order them so that earlier \
         subtopics provide context for later ones.\n\n\
         Topic: {topic}\n\n\
         Return a JSON array of short subtopic strings."
    )
}

pub fn route(subtopic: &str, current_query: Option<&str>) -> String {
    let mut prompt = format!(
        "{ROUTER_ROLE}\n\
         Choose the retrieval tool for this subtopic.\n\
         - \"{web}\": general web content, news, industry and product material\n\
         - \"{academic}\": peer-reviewed papers and preprints (arXiv)\n\n\
         Subtopic: {subtopic}\n",
        web = ToolKind::WebSearch.label(),
        academic = ToolKind::AcademicSearch.label(),
    );
    if let Some(query) = current_query {
        let _ = writeln!(prompt, "Current search intent: {query}");
    }
    let _ = write!(
        prompt,
        "\nAnswer with exactly one label: {} or {}.",
        ToolKind::WebSearch.label(),
        ToolKind::AcademicSearch.label()
    );
    prompt
}

pub fn query(subtopic: &str, tool: ToolKind, refinement: Option<&str>) -> String {
    let mut prompt = format!(
        "{QUERY_ROLE}\n\
         Write {style} for the subtopic below.\n\n\
         Subtopic: {subtopic}\n",
        style = tool.query_style(),
    );
    if let Some(hint) = refinement {
        let _ = writeln!(
            prompt,
            "Previous results were insufficient. Follow this refined intent: {hint}"
        );
    }
    prompt.push_str("\nReturn only the query text on a single line.");
    prompt
}

pub fn judge(subtopic: &str, evidence: &[EvidenceFragment]) -> String {
    format!(
        "{ANALYST_ROLE}\n\
         Decide whether the evidence below is sufficient to write a short, accurate \
         section about the subtopic. Evidence that is off-topic, contradictory or too \
         thin is insufficient.\n\n\
         Subtopic: {subtopic}\n\n\
         Evidence:\n{evidence}\n\
         Return a JSON object: {{\"verdict\": \"sufficient\" | \"insufficient\", \"reason\": \"<one sentence>\"}}",
        evidence = render_fragments(evidence),
    )
}

pub fn refine(subtopic: &str, current_query: Option<&str>, evidence: &[EvidenceFragment]) -> String {
    format!(
        "{REFINER_ROLE}\n\
         The search for this subtopic did not produce sufficient evidence. Explain in \
         one line what is missing, then propose a revised search intent that is more \
         likely to succeed. You may broaden, narrow or rephrase it.\n\n\
         Subtopic: {subtopic}\n\
         Previous query: {query}\n\n\
         Evidence so far:\n{evidence}\n\
         Return only the revised search intent on the final line.",
        query = current_query.unwrap_or("(none)"),
        evidence = render_fragments(evidence),
    )
}

pub fn write(topic: &str, evidence: &EvidenceStore) -> String {
    let mut prompt = format!(
        "{WRITER_ROLE}\n\
         Write a concise, well-structured research report on the topic below using only \
         the evidence provided. Give each subtopic its own section, cite sources inline \
         by URL, and note where evidence was thin.\n\n\
         Topic: {topic}\n"
    );
    for (subtopic, fragments) in evidence.iter() {
        let _ = write!(
            prompt,
            "\n## {subtopic}\n{}",
            render_fragments(fragments)
        );
    }
    prompt
}

fn render_fragments(fragments: &[EvidenceFragment]) -> String {
    if fragments.is_empty() {
        return "(no evidence gathered)\n".to_string();
    }
    let mut rendered = String::new();
    for (idx, fragment) in fragments.iter().enumerate() {
        let _ = writeln!(
            rendered,
            "[{}] ({}) {} <{}>",
            idx + 1,
            fragment.tool,
            truncate(&fragment.text, MAX_FRAGMENT_CHARS),
            fragment.source
        );
    }
    rendered
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
