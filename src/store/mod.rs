//! On-disk layout of the state root and the atomic file primitives every store uses.
//!
//! ```text
//! <root>/
//! ├── runs/<org>/<project>/<uuid>/
//! │   ├── run.json                      # registry record
//! │   ├── run.lock                      # writer lock (see `RunLock`)
//! │   ├── events/000000000001.json      # one file per event
//! │   ├── events.jsonl                  # consolidated event artifact
//! │   └── checkpoints/<checkpoint_id>.json
//! └── archive/<org>/<project>/<uuid>/   # runs moved aside by cleanup
//! ```

pub mod lock;

pub use lock::RunLock;

use runway_common::RunId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::{Result, RunwayError};

pub const RUNS_DIR: &str = "runs";
pub const ARCHIVE_DIR: &str = "archive";
pub const RUN_FILE: &str = "run.json";
pub const LOCK_FILE: &str = "run.lock";
pub const EVENTS_DIR: &str = "events";
pub const CONSOLIDATED_FILE: &str = "events.jsonl";
pub const CHECKPOINTS_DIR: &str = "checkpoints";

/// Path arithmetic for the state root. Cheap to clone; every store holds one.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.runs_dir()
            .join(run_id.organization())
            .join(run_id.project())
            .join(run_id.uuid().to_string())
    }

    pub fn archived_run_dir(&self, run_id: &RunId) -> PathBuf {
        self.archive_dir()
            .join(run_id.organization())
            .join(run_id.project())
            .join(run_id.uuid().to_string())
    }

    pub fn run_file(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(RUN_FILE)
    }

    pub fn lock_file(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(LOCK_FILE)
    }

    pub fn events_dir(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(EVENTS_DIR)
    }

    pub fn event_file(&self, run_id: &RunId, sequence: u64) -> PathBuf {
        self.events_dir(run_id).join(format!("{:012}.json", sequence))
    }

    pub fn consolidated_file(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(CONSOLIDATED_FILE)
    }

    pub fn checkpoints_dir(&self, run_id: &RunId) -> PathBuf {
        self.run_dir(run_id).join(CHECKPOINTS_DIR)
    }

    pub fn checkpoint_file(&self, run_id: &RunId, checkpoint_id: &str) -> PathBuf {
        self.checkpoints_dir(run_id)
            .join(format!("{}.json", checkpoint_id))
    }
}

pub(crate) fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| RunwayError::storage(path, e))
}

/// Temporary sibling path for `path`. Dot-prefixed so directory scans skip it.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let temp = temp_path_for(path);
    let mut file = File::create(&temp).map_err(|e| RunwayError::storage(&temp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&temp);
            RunwayError::storage(&temp, e)
        })?;
    Ok(temp)
}

/// Write `bytes` to `path` all-or-nothing: write a temp file, fsync, rename over.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = write_temp(path, bytes)?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        RunwayError::storage(path, e)
    })
}

/// Like [`atomic_write`], but refuses to replace an existing file.
///
/// Returns `Ok(false)` without writing when `path` already exists.
pub(crate) fn atomic_create(path: &Path, bytes: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let temp = write_temp(path, bytes)?;
    // hard_link fails with AlreadyExists instead of replacing the target.
    let committed = match fs::hard_link(&temp, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(RunwayError::storage(path, e)),
    };
    let _ = fs::remove_file(&temp);
    committed
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| RunwayError::serialization(path, e))?;
    atomic_write(path, json.as_bytes())
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| RunwayError::storage(path, e))?;
    serde_json::from_str(&content).map_err(|e| RunwayError::serialization(path, e))
}

/// Remove a directory tree if it exists.
pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunwayError::storage(path, e)),
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RunwayError::storage(path, e)),
    }
}
