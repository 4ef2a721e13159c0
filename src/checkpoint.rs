//! Checkpoint store: write-once snapshots of a run's working state.
//!
//! Checkpoints live under `runs/<org>/<project>/<uuid>/checkpoints/<id>.json`.
//! Ids embed their creation time (`cp_<YYYYmmddTHHMMSSffffff>_<hex>`) so a
//! lexical sort of one run's ids is also a chronological sort.

use chrono::Utc;
use regex::Regex;
use runway_common::{Checkpoint, PhaseName, RunId};
use std::fs;
use std::sync::LazyLock;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::errors::{Result, RunwayError};
use crate::store::{self, CHECKPOINTS_DIR, StoreLayout};

static CHECKPOINT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cp_[0-9]{8}T[0-9]{12}_[0-9a-f]{8}$").unwrap());

/// Collisions need two captures in the same microsecond with the same random
/// suffix; retry a few times rather than loop forever.
const MAX_ID_ATTEMPTS: usize = 4;

pub fn generate_checkpoint_id() -> String {
    let now = Utc::now();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("cp_{}_{}", now.format("%Y%m%dT%H%M%S%6f"), &suffix[..8])
}

pub fn is_valid_checkpoint_id(id: &str) -> bool {
    CHECKPOINT_ID_RE.is_match(id)
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: StoreLayout,
}

impl CheckpointStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Persist a new checkpoint and return it. Never overwrites an existing one.
    pub fn capture(
        &self,
        run_id: &RunId,
        phase: Option<PhaseName>,
        step: Option<String>,
        state: serde_json::Value,
    ) -> Result<Checkpoint> {
        store::ensure_dir(&self.layout.checkpoints_dir(run_id))?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let checkpoint = Checkpoint {
                checkpoint_id: generate_checkpoint_id(),
                run_id: run_id.clone(),
                phase,
                step: step.clone(),
                state: state.clone(),
                created_at: Utc::now(),
            };
            let path = self.layout.checkpoint_file(run_id, &checkpoint.checkpoint_id);
            let json = serde_json::to_vec_pretty(&checkpoint)
                .map_err(|e| RunwayError::serialization(&path, e))?;
            if store::atomic_create(&path, &json)? {
                debug!(
                    run_id = %run_id,
                    checkpoint_id = %checkpoint.checkpoint_id,
                    phase = ?phase,
                    "captured checkpoint"
                );
                return Ok(checkpoint);
            }
        }

        Err(RunwayError::Validation(format!(
            "could not allocate a unique checkpoint id for run {}",
            run_id
        )))
    }

    /// Look a checkpoint up by id alone, searching every run.
    pub fn read(&self, checkpoint_id: &str) -> Result<Checkpoint> {
        if !is_valid_checkpoint_id(checkpoint_id) {
            return Err(RunwayError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let file_name = format!("{}.json", checkpoint_id);

        // runs/<org>/<project>/<uuid>/checkpoints/<id>.json
        let found = WalkDir::new(self.layout.runs_dir())
            .min_depth(5)
            .max_depth(5)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| {
                entry.file_type().is_file()
                    && entry.file_name().to_string_lossy() == file_name
                    && entry
                        .path()
                        .parent()
                        .and_then(|p| p.file_name())
                        .is_some_and(|name| name == CHECKPOINTS_DIR)
            });

        match found {
            Some(entry) => store::read_json(entry.path()),
            None => Err(RunwayError::CheckpointNotFound(checkpoint_id.to_string())),
        }
    }

    /// Look a checkpoint up within one run. A checkpoint that belongs to a
    /// different run is reported as not found.
    pub fn read_for_run(&self, run_id: &RunId, checkpoint_id: &str) -> Result<Checkpoint> {
        if !is_valid_checkpoint_id(checkpoint_id) {
            return Err(RunwayError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let path = self.layout.checkpoint_file(run_id, checkpoint_id);
        if !path.exists() {
            return Err(RunwayError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        let checkpoint: Checkpoint = store::read_json(&path)?;
        if &checkpoint.run_id != run_id {
            return Err(RunwayError::CheckpointNotFound(checkpoint_id.to_string()));
        }
        Ok(checkpoint)
    }

    /// Every checkpoint of the run, oldest first. Unreadable files are skipped.
    pub fn list(&self, run_id: &RunId) -> Result<Vec<Checkpoint>> {
        let dir = self.layout.checkpoints_dir(run_id);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RunwayError::storage(&dir, e)),
        };

        let mut checkpoints = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| RunwayError::storage(&dir, e))?;
            let path = entry.path();
            let is_checkpoint = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(is_valid_checkpoint_id);
            if !is_checkpoint {
                continue;
            }
            match store::read_json::<Checkpoint>(&path) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }

        checkpoints.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.checkpoint_id.cmp(&b.checkpoint_id))
        });
        Ok(checkpoints)
    }

    pub fn latest(&self, run_id: &RunId) -> Result<Option<Checkpoint>> {
        Ok(self.list(run_id)?.pop())
    }

    /// Remove a checkpoint captured for a transition that failed to commit.
    pub(crate) fn discard(&self, run_id: &RunId, checkpoint_id: &str) -> Result<()> {
        store::remove_file_if_exists(&self.layout.checkpoint_file(run_id, checkpoint_id))
    }

    /// Delete every checkpoint of the run.
    pub fn purge(&self, run_id: &RunId) -> Result<()> {
        store::remove_dir_if_exists(&self.layout.checkpoints_dir(run_id))
    }
}
