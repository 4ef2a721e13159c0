//! The fixed Frame → Architect → Build → Evaluate → Release pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// One stage of the pipeline. Variant order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Frame,
    Architect,
    Build,
    Evaluate,
    Release,
}

impl PhaseName {
    pub const ALL: [PhaseName; 5] = [
        PhaseName::Frame,
        PhaseName::Architect,
        PhaseName::Build,
        PhaseName::Evaluate,
        PhaseName::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Frame => "frame",
            PhaseName::Architect => "architect",
            PhaseName::Build => "build",
            PhaseName::Evaluate => "evaluate",
            PhaseName::Release => "release",
        }
    }

    /// Position in the fixed pipeline, starting at 0.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseName {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "frame" => Ok(PhaseName::Frame),
            "architect" => Ok(PhaseName::Architect),
            "build" => Ok(PhaseName::Build),
            "evaluate" => Ok(PhaseName::Evaluate),
            "release" => Ok(PhaseName::Release),
            _ => Err(ParseError::Phase(s.to_string())),
        }
    }
}

/// Status of one phase within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    /// Completed or skipped: the pipeline may move past this phase.
    pub fn is_done(&self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run record of a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: PhaseName,
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
}

impl PhaseRecord {
    pub fn new(phase: PhaseName) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            started_at: None,
            ended_at: None,
            retry_count: 0,
        }
    }

    /// Mark the phase as entered now. Re-entering clears any previous end time.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = PhaseStatus::InProgress;
        self.started_at = Some(now);
        self.ended_at = None;
    }

    pub fn finish(&mut self, status: PhaseStatus, now: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(now);
    }

    /// Return the record to its untouched state.
    pub fn reset(&mut self) {
        *self = Self::new(self.phase);
    }
}
