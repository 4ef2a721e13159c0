//! Per-run writer lock.
//!
//! The engine assumes a single writer per run but does not enforce it. Callers
//! that drive a run (the CLI, the drive loop, cleanup) hold a `RunLock` while
//! mutating. The lock is an advisory exclusive `flock` on `run.lock`, released
//! on drop or when the process exits.

use fs2::FileExt;
use runway_common::RunId;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

use super::{StoreLayout, ensure_dir};
use crate::errors::{Result, RunwayError};

#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
    run_id: RunId,
}

impl RunLock {
    /// Take the writer lock for `run_id` without blocking.
    ///
    /// Fails with `RunwayError::Locked` if another process holds it.
    pub fn acquire(layout: &StoreLayout, run_id: &RunId) -> Result<Self> {
        ensure_dir(&layout.run_dir(run_id))?;
        let path = layout.lock_file(run_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| RunwayError::storage(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(run_id = %run_id, "acquired run lock");
                Ok(Self {
                    file,
                    path,
                    run_id: run_id.clone(),
                })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(RunwayError::Locked {
                run_id: run_id.clone(),
            }),
            Err(e) => Err(RunwayError::storage(&path, e)),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(run_id = %self.run_id, "released run lock");
    }
}
