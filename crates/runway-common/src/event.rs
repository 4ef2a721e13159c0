//! Events: immutable facts appended to a run's log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::id::RunId;
use crate::phase::PhaseName;

/// Event type. Known lifecycle types have their own variant; collaborators may
/// report any other snake_case type, which is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    WorkflowStarted,
    PhaseStarted,
    PhaseCompleted,
    PhaseFailed,
    PhaseRetried,
    AgentCompleted,
    StepCompleted,
    CheckpointCreated,
    Error,
    WorkflowPaused,
    WorkflowResumed,
    WorkflowRecovered,
    WorkflowCompleted,
    WorkflowFailed,
    WorkflowCancelled,
    WorkflowCleanup,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::WorkflowStarted => "workflow_started",
            EventType::PhaseStarted => "phase_started",
            EventType::PhaseCompleted => "phase_completed",
            EventType::PhaseFailed => "phase_failed",
            EventType::PhaseRetried => "phase_retried",
            EventType::AgentCompleted => "agent_completed",
            EventType::StepCompleted => "step_completed",
            EventType::CheckpointCreated => "checkpoint_created",
            EventType::Error => "error",
            EventType::WorkflowPaused => "workflow_paused",
            EventType::WorkflowResumed => "workflow_resumed",
            EventType::WorkflowRecovered => "workflow_recovered",
            EventType::WorkflowCompleted => "workflow_completed",
            EventType::WorkflowFailed => "workflow_failed",
            EventType::WorkflowCancelled => "workflow_cancelled",
            EventType::WorkflowCleanup => "workflow_cleanup",
            EventType::Custom(name) => name,
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        match value {
            "workflow_started" => EventType::WorkflowStarted,
            "phase_started" => EventType::PhaseStarted,
            "phase_completed" => EventType::PhaseCompleted,
            "phase_failed" => EventType::PhaseFailed,
            "phase_retried" => EventType::PhaseRetried,
            "agent_completed" => EventType::AgentCompleted,
            "step_completed" => EventType::StepCompleted,
            "checkpoint_created" => EventType::CheckpointCreated,
            "error" => EventType::Error,
            "workflow_paused" => EventType::WorkflowPaused,
            "workflow_resumed" => EventType::WorkflowResumed,
            "workflow_recovered" => EventType::WorkflowRecovered,
            "workflow_completed" => EventType::WorkflowCompleted,
            "workflow_failed" => EventType::WorkflowFailed,
            "workflow_cancelled" => EventType::WorkflowCancelled,
            "workflow_cleanup" => EventType::WorkflowCleanup,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        EventType::from(value.as_str())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to something a phase produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Error details attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub recoverable: bool,
}

impl EventError {
    pub fn new(code: &str, message: &str, recoverable: bool) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            recoverable,
        }
    }
}

/// A persisted event. `sequence` starts at 1 and has no gaps within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub run_id: RunId,
    pub sequence: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<PhaseName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
    pub timestamp: DateTime<Utc>,
}

/// An event as reported by a caller, before validation and sequencing.
///
/// `event_type` is optional here so that a missing type is reported as a
/// validation failure by the event log rather than being unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub phase: Option<PhaseName>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub error: Option<EventError>,
}

impl EventDraft {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type: Some(event_type.as_str().to_string()),
            ..Default::default()
        }
    }

    pub fn phase(mut self, phase: PhaseName) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn maybe_phase(mut self, phase: Option<PhaseName>) -> Self {
        self.phase = phase;
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn error(mut self, error: EventError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_event_types_roundtrip_through_strings() {
        for name in [
            "workflow_started",
            "phase_completed",
            "agent_completed",
            "workflow_cleanup",
            "error",
        ] {
            let ty = EventType::from(name);
            assert!(!matches!(ty, EventType::Custom(_)), "{name} should be known");
            assert_eq!(ty.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_event_type_is_custom() {
        let ty = EventType::from("lint_passed");
        assert_eq!(ty, EventType::Custom("lint_passed".to_string()));
        assert_eq!(ty.to_string(), "lint_passed");
    }

    #[test]
    fn test_event_serializes_type_field() {
        let event = Event {
            run_id: RunId::generate("acme", "billing").unwrap(),
            sequence: 1,
            event_type: EventType::PhaseStarted,
            phase: Some(PhaseName::Build),
            step: None,
            status: Some("in_progress".to_string()),
            message: None,
            metadata: BTreeMap::new(),
            artifacts: Vec::new(),
            error: None,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "phase_started");
        assert_eq!(value["phase"], "build");
        assert!(value.get("metadata").is_none());
    }

    #[test]
    fn test_draft_builder_collects_fields() {
        let draft = EventDraft::new(EventType::Error)
            .phase(PhaseName::Evaluate)
            .message("tests failed")
            .meta("attempt", 2)
            .error(EventError::new("tests_failed", "3 failures", true));
        assert_eq!(draft.event_type.as_deref(), Some("error"));
        assert_eq!(draft.metadata["attempt"], serde_json::json!(2));
        assert!(draft.error.unwrap().recoverable);
    }

    #[test]
    fn test_draft_deserializes_without_type() {
        let draft: EventDraft = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert!(draft.event_type.is_none());
        assert_eq!(draft.message.as_deref(), Some("hi"));
    }
}
