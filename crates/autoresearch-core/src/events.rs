//! Progress event bus for presentation layers and trace collection.
//!
//! The engine pushes one event per state transition plus decision, degradation
//! and completion notices. This is a one-way channel: nothing sent back through
//! it can influence a run.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use crate::search::ToolKind;
use crate::state::Decision;
use crate::workflow::WorkflowState;

/// Unique identifier for an event
pub type EventId = String;

/// Workflow lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The engine entered a new state
    Transition {
        event_id: EventId,
        timestamp: u64,
        run_id: String,
        state: WorkflowState,
        subtopic: Option<String>,
        attempt_count: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<ToolKind>,
    },
    /// Analyzer verdict for the current subtopic
    Decision {
        event_id: EventId,
        timestamp: u64,
        run_id: String,
        subtopic: Option<String>,
        attempt_count: u32,
        decision: Decision,
    },
    /// A node failed and the engine substituted a safe default
    Degraded {
        event_id: EventId,
        timestamp: u64,
        run_id: String,
        node: String,
        reason: String,
    },
    /// Terminal notice
    Finished {
        event_id: EventId,
        timestamp: u64,
        run_id: String,
        status: RunStatus,
    },
}

impl Event {
    pub fn event_id(&self) -> &str {
        match self {
            Event::Transition { event_id, .. } => event_id,
            Event::Decision { event_id, .. } => event_id,
            Event::Degraded { event_id, .. } => event_id,
            Event::Finished { event_id, .. } => event_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Transition { timestamp, .. } => *timestamp,
            Event::Decision { timestamp, .. } => *timestamp,
            Event::Degraded { timestamp, .. } => *timestamp,
            Event::Finished { timestamp, .. } => *timestamp,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Event::Transition { run_id, .. } => run_id,
            Event::Decision { run_id, .. } => run_id,
            Event::Degraded { run_id, .. } => run_id,
            Event::Finished { run_id, .. } => run_id,
        }
    }

    pub(crate) fn transition(
        run_id: &str,
        sequence: u64,
        state: WorkflowState,
        subtopic: Option<&str>,
        attempt_count: u32,
        tool: Option<ToolKind>,
    ) -> Self {
        Event::Transition {
            event_id: sequence_id(sequence),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            state,
            subtopic: subtopic.map(str::to_string),
            attempt_count,
            tool,
        }
    }

    pub(crate) fn decision(
        run_id: &str,
        sequence: u64,
        subtopic: Option<&str>,
        attempt_count: u32,
        decision: Decision,
    ) -> Self {
        Event::Decision {
            event_id: sequence_id(sequence),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            subtopic: subtopic.map(str::to_string),
            attempt_count,
            decision,
        }
    }

    pub(crate) fn degraded(run_id: &str, sequence: u64, node: &str, reason: String) -> Self {
        Event::Degraded {
            event_id: sequence_id(sequence),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            node: node.to_string(),
            reason,
        }
    }

    pub(crate) fn finished(run_id: &str, sequence: u64, status: RunStatus) -> Self {
        Event::Finished {
            event_id: sequence_id(sequence),
            timestamp: current_timestamp(),
            run_id: run_id.to_string(),
            status,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted { reason: String },
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Sending half of the progress channel. Cheap to clone; may be shared by
/// concurrent runs since every event carries its run id.
#[derive(Clone)]
pub struct EventCollector {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Forward an event. A closed receiver is logged, never surfaced.
    pub fn emit(&self, event: Event) {
        if let Err(e) = self.sender.send(event) {
            tracing::trace!(error = %e, "progress receiver dropped; event discarded");
        }
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new().0
    }
}

/// Event ids are a per-run sequence, so they order a trace and never collide
/// within one run.
fn sequence_id(sequence: u64) -> EventId {
    format!("evt_{sequence}")
}

/// Get current Unix timestamp in milliseconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_collector() {
        let (collector, mut receiver) = EventCollector::new();

        collector.emit(Event::transition(
            "run-1",
            0,
            WorkflowState::Routing,
            Some("surface codes"),
            0,
            None,
        ));

        let event = receiver.recv().await.unwrap();
        match event {
            Event::Transition {
                run_id,
                state,
                subtopic,
                ..
            } => {
                assert_eq!(run_id, "run-1");
                assert_eq!(state, WorkflowState::Routing);
                assert_eq!(subtopic.as_deref(), Some("surface codes"));
            }
            _ => panic!("Expected Transition event"),
        }
    }

    #[test]
    fn emitting_after_receiver_drop_is_silent() {
        let (collector, receiver) = EventCollector::new();
        drop(receiver);
        collector.emit(Event::finished("run-1", 0, RunStatus::Completed));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::decision("run-1", 3, Some("thresholds"), 1, Decision::Rewrite);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "decision");
        assert_eq!(json["decision"], "rewrite");
        assert_eq!(json["attempt_count"], 1);
        assert_eq!(json["event_id"], "evt_3");
    }
}
