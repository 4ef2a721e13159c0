//! The run record: the unit of orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::id::RunId;
use crate::phase::{PhaseName, PhaseRecord, PhaseStatus};

/// Lifecycle status of a run.
///
/// `Completed` and `Cancelled` are terminal. `Failed` is terminal for automatic
/// progress but can be recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    InProgress,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Completed or cancelled: no operation may change the run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Cancelled)
    }

    /// Eligible for retention cleanup: completed, failed or cancelled.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// In progress or paused: a run some caller is still driving.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::InProgress | RunStatus::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(RunStatus::Pending),
            "in_progress" | "running" => Ok(RunStatus::InProgress),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" | "canceled" => Ok(RunStatus::Cancelled),
            _ => Err(ParseError::RunStatus(s.to_string())),
        }
    }
}

/// How much the pipeline may proceed without human approval.
///
/// | Level        | Default gates                 |
/// |--------------|-------------------------------|
/// | `dry-run`    | every phase, nothing executes |
/// | `assist`     | every phase                   |
/// | `guarded`    | architect, release            |
/// | `autonomous` | none                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutonomyLevel {
    DryRun,
    Assist,
    #[default]
    Guarded,
    Autonomous,
}

impl AutonomyLevel {
    pub const ALL: [AutonomyLevel; 4] = [
        AutonomyLevel::DryRun,
        AutonomyLevel::Assist,
        AutonomyLevel::Guarded,
        AutonomyLevel::Autonomous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::DryRun => "dry-run",
            AutonomyLevel::Assist => "assist",
            AutonomyLevel::Guarded => "guarded",
            AutonomyLevel::Autonomous => "autonomous",
        }
    }

    /// Phases that pause for approval after completing, absent configuration overrides.
    pub fn default_gates(&self) -> Vec<PhaseName> {
        match self {
            AutonomyLevel::DryRun | AutonomyLevel::Assist => PhaseName::ALL.to_vec(),
            AutonomyLevel::Guarded => vec![PhaseName::Architect, PhaseName::Release],
            AutonomyLevel::Autonomous => Vec::new(),
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutonomyLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "dry-run" | "dryrun" => Ok(AutonomyLevel::DryRun),
            "assist" => Ok(AutonomyLevel::Assist),
            "guarded" => Ok(AutonomyLevel::Guarded),
            "autonomous" => Ok(AutonomyLevel::Autonomous),
            _ => Err(ParseError::Autonomy(s.to_string())),
        }
    }
}

/// Canonical run record, owned by the run registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<PhaseName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    pub autonomy_level: AutonomyLevel,
    pub max_retries: u32,
    /// Records for the phases of this run's workflow, in pipeline order.
    pub phases: Vec<PhaseRecord>,
    /// Gated phase that completed and awaits approval via resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_gate: Option<PhaseName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Run {
    /// Create a pending run over the given phases.
    pub fn new(
        run_id: RunId,
        workflow_id: &str,
        work_item_id: Option<String>,
        autonomy_level: AutonomyLevel,
        max_retries: u32,
        phases: &[PhaseName],
    ) -> Self {
        let now = Utc::now();
        let mut ordered = phases.to_vec();
        ordered.sort();
        ordered.dedup();
        Self {
            run_id,
            workflow_id: workflow_id.to_string(),
            work_item_id,
            status: RunStatus::Pending,
            current_phase: None,
            current_step: None,
            autonomy_level,
            max_retries,
            phases: ordered.into_iter().map(PhaseRecord::new).collect(),
            pending_gate: None,
            created_at: now,
            updated_at: now,
            metadata: BTreeMap::new(),
        }
    }

    pub fn has_phase(&self, phase: PhaseName) -> bool {
        self.phases.iter().any(|p| p.phase == phase)
    }

    pub fn phase(&self, phase: PhaseName) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    pub fn phase_mut(&mut self, phase: PhaseName) -> Option<&mut PhaseRecord> {
        self.phases.iter_mut().find(|p| p.phase == phase)
    }

    /// First phase of the workflow that is not skipped.
    pub fn first_phase(&self) -> Option<PhaseName> {
        self.phases
            .iter()
            .find(|p| p.status != PhaseStatus::Skipped)
            .map(|p| p.phase)
    }

    /// Next phase after `phase` that is not skipped, in pipeline order.
    pub fn next_phase_after(&self, phase: PhaseName) -> Option<PhaseName> {
        self.phases
            .iter()
            .filter(|p| p.phase > phase)
            .find(|p| p.status != PhaseStatus::Skipped)
            .map(|p| p.phase)
    }

    pub fn phase_names(&self) -> Vec<PhaseName> {
        self.phases.iter().map(|p| p.phase).collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
