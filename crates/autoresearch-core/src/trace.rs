use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::events::{Event, RunStatus};

/// One rendered line of a run's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub stage: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

fn describe(event: &Event) -> (String, Option<String>) {
    match event {
        Event::Transition {
            state,
            subtopic,
            attempt_count,
            ..
        } => (
            state.to_string(),
            subtopic
                .as_ref()
                .map(|subtopic| format!("{subtopic} (attempt {attempt_count})")),
        ),
        Event::Decision {
            subtopic,
            attempt_count,
            decision,
            ..
        } => {
            let detail = match subtopic {
                Some(subtopic) => format!("{decision} for {subtopic} (attempt {attempt_count})"),
                None => decision.to_string(),
            };
            ("decision".to_string(), Some(detail))
        }
        Event::Degraded { node, reason, .. } => (format!("degraded:{node}"), Some(reason.clone())),
        Event::Finished { status, .. } => {
            let detail = match status {
                RunStatus::Completed => status.as_str().to_string(),
                RunStatus::Aborted { reason } => format!("aborted: {reason}"),
            };
            ("finished".to_string(), Some(detail))
        }
    }
}

impl TraceSummary {
    pub fn from_events(events: &[Event]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| {
                let (stage, detail) = describe(event);
                TraceStep {
                    index: idx + 1,
                    stage,
                    detail,
                }
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            match &step.detail {
                Some(detail) => {
                    let _ = writeln!(output, "{}. {} → {}", step.index, step.stage, detail);
                }
                None => {
                    let _ = writeln!(output, "{}. {}", step.index, step.stage);
                }
            }
        }
        output
    }

    pub fn render_mermaid(&self) -> String {
        if self.steps.is_empty() {
            return "flowchart TD\n  %% no trace events captured".to_string();
        }

        let mut output = String::from("flowchart TD\n");
        for step in &self.steps {
            let label = match &step.detail {
                Some(detail) => sanitize_mermaid(&format!("{}: {}", step.stage, detail)),
                None => sanitize_mermaid(&step.stage),
            };
            let _ = writeln!(output, "  step{}[\"{label}\"]", step.index);
        }
        for idx in 1..self.steps.len() {
            let _ = writeln!(output, "  step{idx} --> step{}", idx + 1);
        }
        output
    }
}

fn sanitize_mermaid(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('[', "(")
        .replace(']', ")")
        .replace('\n', "<br/>")
}

/// Write `<run_id>.json` (raw events) and `<run_id>.md` (summary) into `dir`.
/// Returns the JSON path.
///
/// `run_id` becomes a file stem, so ids containing path separators or naming
/// `.`/`..` are rejected before anything is written.
pub fn persist_trace<P: AsRef<Path>>(dir: P, run_id: &str, events: &[Event]) -> Result<PathBuf> {
    if run_id.is_empty()
        || run_id == "."
        || run_id == ".."
        || run_id.contains(['/', '\\'])
    {
        bail!("run id {run_id:?} is not usable as a trace file name");
    }
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;

    let path = dir.join(format!("{run_id}.json"));
    let payload = serde_json::to_vec_pretty(events)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;

    let summary_path = dir.join(format!("{run_id}.md"));
    std::fs::write(
        &summary_path,
        TraceSummary::from_events(events).render_markdown(),
    )
    .with_context(|| format!("failed to write trace summary {}", summary_path.display()))?;

    Ok(path)
}
