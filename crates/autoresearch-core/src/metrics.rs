use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};

use crate::state::Decision;

struct WorkflowMetrics {
    runs: Counter<u64>,
    duration_ms: Histogram<f64>,
    decisions: Counter<u64>,
    degraded: Counter<u64>,
}

static METRICS: OnceCell<WorkflowMetrics> = OnceCell::new();

fn handles() -> &'static WorkflowMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("autoresearch.workflow");
        WorkflowMetrics {
            runs: meter
                .u64_counter("research_runs_total")
                .with_description("Total research runs by terminal status")
                .init(),
            duration_ms: meter
                .f64_histogram("research_run_duration_ms")
                .with_description("Research run wall time in milliseconds")
                .init(),
            decisions: meter
                .u64_counter("analysis_decisions_total")
                .with_description("Analyzer decisions by outcome")
                .init(),
            degraded: meter
                .u64_counter("degraded_steps_total")
                .with_description("Node failures absorbed with a safe default")
                .init(),
        }
    })
}

/// Record a finished run (no-op if no meter provider is installed).
pub fn record_run(status: &str, duration_ms: u64, subtopics: usize) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("status", status.to_string()),
        KeyValue::new("subtopics", subtopics as i64),
    ];
    metrics.runs.add(1, &attrs);
    metrics.duration_ms.record(duration_ms as f64, &attrs);
}

pub fn record_decision(decision: Decision) {
    handles()
        .decisions
        .add(1, &[KeyValue::new("decision", decision.as_str())]);
}

pub fn record_degraded(node: &str) {
    handles()
        .degraded
        .add(1, &[KeyValue::new("node", node.to_string())]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_provider_is_noop() {
        record_run("completed", 12, 2);
        record_decision(Decision::Rewrite);
        record_degraded("router");
    }
}
