//! Run registry: the durable `run.json` record of every run and the index used
//! to list and filter them.
//!
//! The set of `run.json` files is the index; listing never scans event history.

use runway_common::{Run, RunId, RunStatus};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::{Result, RunwayError};
use crate::events::EventLog;
use crate::store::{self, RUN_FILE, StoreLayout};

pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Criteria for [`RunRegistry::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub work_item_id: Option<String>,
    pub status: Option<RunStatus>,
    pub organization: Option<String>,
    pub project: Option<String>,
    pub workflow_id: Option<String>,
}

impl RunFilter {
    pub fn matches(&self, run: &Run) -> bool {
        if self
            .work_item_id
            .as_ref()
            .is_some_and(|w| run.work_item_id.as_ref() != Some(w))
        {
            return false;
        }
        if self.status.is_some_and(|s| s != run.status) {
            return false;
        }
        if self
            .organization
            .as_deref()
            .is_some_and(|org| run.run_id.organization() != org)
        {
            return false;
        }
        if self
            .project
            .as_deref()
            .is_some_and(|project| run.run_id.project() != project)
        {
            return false;
        }
        if self
            .workflow_id
            .as_deref()
            .is_some_and(|workflow| run.workflow_id != workflow)
        {
            return false;
        }
        true
    }
}

/// A run as returned to callers, optionally with the size of its event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunView {
    #[serde(flatten)]
    pub run: Run,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunRegistry {
    layout: StoreLayout,
    events: EventLog,
}

impl RunRegistry {
    pub fn new(layout: StoreLayout) -> Self {
        let events = EventLog::new(layout.clone());
        Self { layout, events }
    }

    pub fn load(&self, run_id: &RunId) -> Result<Run> {
        let path = self.layout.run_file(run_id);
        if !path.exists() {
            return Err(RunwayError::RunNotFound(run_id.to_string()));
        }
        store::read_json(&path)
    }

    pub fn get(&self, run_id: &RunId, include_events: bool) -> Result<RunView> {
        let run = self.load(run_id)?;
        let event_count = if include_events {
            Some(self.events.count(run_id)?)
        } else {
            None
        };
        Ok(RunView { run, event_count })
    }

    pub fn exists(&self, run_id: &RunId) -> bool {
        self.layout.run_file(run_id).exists()
    }

    /// Write the record atomically. Writing the same record twice is a no-op
    /// in effect.
    pub fn upsert(&self, run: &Run) -> Result<()> {
        store::write_json(&self.layout.run_file(&run.run_id), run)?;
        debug!(run_id = %run.run_id, status = %run.status, "registry record written");
        Ok(())
    }

    /// Matching runs, most recently updated first, at most `limit` of them.
    ///
    /// Records that cannot be read are logged and skipped.
    pub fn list(&self, filter: &RunFilter, limit: usize) -> Result<Vec<Run>> {
        let mut runs = self.scan(filter)?;
        runs.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs.truncate(limit);
        Ok(runs)
    }

    /// Every matching run, unordered and unbounded.
    pub fn scan(&self, filter: &RunFilter) -> Result<Vec<Run>> {
        let mut base = self.layout.runs_dir();
        // runs/<org>/<project>/<uuid>/run.json
        let mut depth = 4;
        if let Some(org) = &filter.organization {
            base = base.join(org);
            depth -= 1;
            if let Some(project) = &filter.project {
                base = base.join(project);
                depth -= 1;
            }
        }
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in WalkDir::new(&base)
            .min_depth(depth)
            .max_depth(depth)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == RUN_FILE)
        {
            match store::read_json::<Run>(entry.path()) {
                Ok(run) if filter.matches(&run) => runs.push(run),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "skipping unreadable run record")
                }
            }
        }
        Ok(runs)
    }

    /// Runs some caller is still driving (in progress or paused).
    pub fn active(&self, organization: Option<&str>, project: Option<&str>) -> Result<Vec<Run>> {
        let filter = RunFilter {
            organization: organization.map(str::to_string),
            project: organization.and(project).map(str::to_string),
            ..Default::default()
        };
        let mut runs: Vec<Run> = self
            .scan(&filter)?
            .into_iter()
            .filter(|run| run.status.is_active())
            .filter(|run| project.is_none_or(|p| run.run_id.project() == p))
            .collect();
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(runs)
    }

    /// Remove the run's record and its whole container.
    pub fn delete(&self, run_id: &RunId) -> Result<()> {
        let dir = self.layout.run_dir(run_id);
        if !dir.exists() {
            return Err(RunwayError::RunNotFound(run_id.to_string()));
        }
        store::remove_file_if_exists(&self.layout.run_file(run_id))?;
        store::remove_dir_if_exists(&dir)?;
        self.prune_empty_parents(&dir);
        info!(run_id = %run_id, "deleted run");
        Ok(())
    }

    /// Move the run's container under `archive/`, returning its new location.
    pub fn archive(&self, run_id: &RunId) -> Result<PathBuf> {
        let dir = self.layout.run_dir(run_id);
        if !dir.exists() {
            return Err(RunwayError::RunNotFound(run_id.to_string()));
        }
        let target = self.layout.archived_run_dir(run_id);
        if let Some(parent) = target.parent() {
            store::ensure_dir(parent)?;
        }
        store::remove_dir_if_exists(&target)?;
        fs::rename(&dir, &target).map_err(|e| RunwayError::storage(&dir, e))?;
        self.prune_empty_parents(&dir);
        info!(run_id = %run_id, path = %target.display(), "archived run");
        Ok(target)
    }

    /// Drop now-empty `<org>/<project>` directories left behind by a removal.
    fn prune_empty_parents(&self, run_dir: &std::path::Path) {
        let runs_dir = self.layout.runs_dir();
        let mut current = run_dir.parent();
        while let Some(dir) = current {
            if dir == runs_dir || !dir.starts_with(&runs_dir) {
                break;
            }
            // remove_dir only succeeds on empty directories.
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}
