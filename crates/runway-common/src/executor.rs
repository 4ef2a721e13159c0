//! Phase execution boundary.
//!
//! The engine never performs a phase's work itself. A `PhaseExecutor` does the
//! work and returns a `PhaseReport`, which the caller feeds back into the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::event::EventError;
use crate::id::RunId;
use crate::phase::PhaseName;
use crate::run::AutonomyLevel;

/// Terminal signal from a phase's external execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseReport {
    /// The phase finished its work (GO, for evaluate).
    Completed,
    /// Evaluate rejected the build.
    NoGo { reason: Option<String> },
    /// The phase could not finish.
    Failed { error: EventError },
}

impl PhaseReport {
    pub fn failed(code: &str, message: &str) -> Self {
        PhaseReport::Failed {
            error: EventError::new(code, message, true),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseReport::Completed => "completed",
            PhaseReport::NoGo { .. } => "no_go",
            PhaseReport::Failed { .. } => "failed",
        }
    }
}

/// What an executor needs to know about the phase it is asked to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseContext {
    pub run_id: RunId,
    pub workflow_id: String,
    pub phase: PhaseName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,
    pub autonomy_level: AutonomyLevel,
    /// Build re-entries caused by evaluate NO-GO so far.
    pub attempt: u32,
}

/// Result of one execution, with enough detail for an `agent_completed` event.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseExecution {
    pub report: PhaseReport,
    pub exit_code: Option<i32>,
    pub duration: Duration,
    pub output: Option<String>,
}

impl PhaseExecution {
    pub fn new(report: PhaseReport, duration: Duration) -> Self {
        Self {
            report,
            exit_code: None,
            duration,
            output: None,
        }
    }
}

/// Abstraction over phase execution. Real implementation: the shell command
/// executor in the `runway` crate. Tests use scripted doubles.
#[async_trait]
pub trait PhaseExecutor: Send + Sync {
    async fn execute(&self, context: &PhaseContext) -> PhaseExecution;
}
