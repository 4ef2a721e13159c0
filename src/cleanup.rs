//! Retention cleanup: delete or archive finished runs past a maximum age.
//!
//! The sweep never fails as a whole. A run that cannot be cleaned up is
//! reported in [`CleanupReport::errors`] and the sweep moves on.

use chrono::{Duration, Utc};
use runway_common::{EventDraft, EventType, Run, RunId};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::CheckpointStore;
use crate::errors::{Result, RunwayError};
use crate::events::EventLog;
use crate::registry::{RunFilter, RunRegistry};
use crate::store::{RunLock, StoreLayout};

/// Code reported for every per-run cleanup failure.
pub const PARTIAL_FAILURE_CODE: &str = "partial_failure";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    /// Remove the run's record, events and checkpoints.
    #[default]
    Delete,
    /// Move the whole run under `archive/`.
    Archive,
}

impl std::fmt::Display for CleanupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleanupMode::Delete => write!(f, "delete"),
            CleanupMode::Archive => write!(f, "archive"),
        }
    }
}

impl std::str::FromStr for CleanupMode {
    type Err = RunwayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "delete" => Ok(CleanupMode::Delete),
            "archive" => Ok(CleanupMode::Archive),
            _ => Err(RunwayError::Validation(format!(
                "Invalid cleanup mode '{}'. Valid values: delete, archive",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOptions {
    pub max_age_days: u32,
    pub mode: CleanupMode,
    /// Report what would be removed without touching anything.
    pub dry_run: bool,
}

/// One run the sweep could not clean up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupFailure {
    pub run_id: String,
    /// Always [`PARTIAL_FAILURE_CODE`].
    pub code: String,
    /// Code of the underlying error, e.g. `storage_error`.
    pub cause: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub deleted: Vec<RunId>,
    pub archived: Vec<RunId>,
    /// Eligible runs; populated on dry runs only.
    pub candidates: Vec<RunId>,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct CleanupService {
    layout: StoreLayout,
    registry: RunRegistry,
    events: EventLog,
    checkpoints: CheckpointStore,
}

impl CleanupService {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            registry: RunRegistry::new(layout.clone()),
            events: EventLog::new(layout.clone()),
            checkpoints: CheckpointStore::new(layout.clone()),
            layout,
        }
    }

    /// Finished runs last updated before the retention threshold, oldest first.
    pub fn eligible(&self, max_age_days: u32) -> Result<Vec<Run>> {
        // An age beyond the representable calendar leaves nothing old enough.
        let Some(threshold) = Duration::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(Vec::new());
        };
        let mut runs: Vec<Run> = self
            .registry
            .scan(&RunFilter::default())?
            .into_iter()
            .filter(|run| run.status.is_finished() && run.updated_at < threshold)
            .collect();
        runs.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(runs)
    }

    pub fn cleanup(&self, options: &CleanupOptions) -> CleanupReport {
        let mut report = CleanupReport::default();

        let eligible = match self.eligible(options.max_age_days) {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "could not scan run registry for cleanup");
                report.errors.push(failure("*", &e));
                return report;
            }
        };

        for run in eligible {
            let run_id = run.run_id.clone();
            if options.dry_run {
                report.candidates.push(run_id);
                continue;
            }
            match self.clean_one(&run, options.mode) {
                Ok(()) => match options.mode {
                    CleanupMode::Delete => report.deleted.push(run_id),
                    CleanupMode::Archive => report.archived.push(run_id),
                },
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "cleanup failed for run");
                    report.errors.push(failure(&run_id.to_string(), &e));
                }
            }
        }

        info!(
            mode = %options.mode,
            dry_run = options.dry_run,
            deleted = report.deleted.len(),
            archived = report.archived.len(),
            candidates = report.candidates.len(),
            errors = report.errors.len(),
            "cleanup finished"
        );
        report
    }

    fn clean_one(&self, run: &Run, mode: CleanupMode) -> Result<()> {
        let lock = RunLock::acquire(&self.layout, &run.run_id)?;
        // Re-read under the lock; the run may have been recovered meanwhile.
        let current = self.registry.load(&run.run_id)?;
        if !current.status.is_finished() {
            return Err(RunwayError::invalid_state(
                &run.run_id,
                current.status,
                "clean up",
            ));
        }

        match mode {
            CleanupMode::Delete => {
                self.checkpoints.purge(&run.run_id)?;
                self.events.purge(&run.run_id)?;
                drop(lock);
                self.registry.delete(&run.run_id)
            }
            CleanupMode::Archive => {
                self.events.append(
                    &run.run_id,
                    EventDraft::new(EventType::WorkflowCleanup)
                        .status(current.status.as_str())
                        .meta("mode", CleanupMode::Archive.to_string()),
                )?;
                drop(lock);
                self.registry.archive(&run.run_id).map(|_| ())
            }
        }
    }
}

fn failure(run_id: &str, error: &RunwayError) -> CleanupFailure {
    CleanupFailure {
        run_id: run_id.to_string(),
        code: PARTIAL_FAILURE_CODE.to_string(),
        cause: error.code().to_string(),
        message: error.to_string(),
    }
}
