//! Append-only, per-run event log.
//!
//! Each event is committed as its own file (`events/<sequence>.json`) through a
//! temp-file-and-link commit, so a crash mid-write never leaves a partial event
//! and never replaces an existing sequence. [`EventLog::consolidate`] merges the
//! per-event files into a single ordered `events.jsonl` for bulk readers.

pub mod stream;

pub use stream::{EventFilter, EventIter, EventStream};

use chrono::Utc;
use regex::Regex;
use runway_common::{Event, EventDraft, EventType, RunId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::errors::{Result, RunwayError};
use crate::store::{self, StoreLayout};

static EVENT_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]{0,63}$").unwrap());

/// Attempts to claim a sequence number before giving up. Only exceeded when a
/// second writer ignores the run lock.
const MAX_SEQUENCE_ATTEMPTS: usize = 8;

/// Result of [`EventLog::consolidate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationReport {
    pub events_consolidated: usize,
    pub path: PathBuf,
    /// SHA-256 of the consolidated artifact, hex encoded.
    pub digest: String,
    /// False when the artifact already held exactly this content.
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct EventLog {
    layout: StoreLayout,
}

impl EventLog {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Validate and append an event reported at the boundary, where the run id
    /// arrives as text.
    pub fn emit(&self, run_id: &str, draft: EventDraft) -> Result<Event> {
        if run_id.trim().is_empty() {
            return Err(RunwayError::Validation("run_id is required".to_string()));
        }
        let run_id: RunId = run_id.parse()?;
        self.append(&run_id, draft)
    }

    /// Validate, sequence, and durably append an event for `run_id`.
    ///
    /// Nothing is written when validation fails.
    pub fn append(&self, run_id: &RunId, draft: EventDraft) -> Result<Event> {
        let event_type = validate_draft(&draft)?;
        let events_dir = self.layout.events_dir(run_id);
        store::ensure_dir(&events_dir)?;

        for _ in 0..MAX_SEQUENCE_ATTEMPTS {
            let sequence = self.last_sequence(run_id)? + 1;
            let event = Event {
                run_id: run_id.clone(),
                sequence,
                event_type: event_type.clone(),
                phase: draft.phase,
                step: draft.step.clone(),
                status: draft.status.clone(),
                message: draft.message.clone(),
                metadata: draft.metadata.clone(),
                artifacts: draft.artifacts.clone(),
                error: draft.error.clone(),
                timestamp: Utc::now(),
            };
            let path = self.layout.event_file(run_id, sequence);
            let json =
                serde_json::to_vec(&event).map_err(|e| RunwayError::serialization(&path, e))?;
            if store::atomic_create(&path, &json)? {
                debug!(
                    run_id = %run_id,
                    sequence,
                    event_type = %event.event_type,
                    phase = ?event.phase,
                    "appended event"
                );
                return Ok(event);
            }
        }

        Err(RunwayError::Locked {
            run_id: run_id.clone(),
        })
    }

    /// Highest committed sequence for the run, 0 when it has no events.
    pub fn last_sequence(&self, run_id: &RunId) -> Result<u64> {
        Ok(self
            .entries(run_id)?
            .into_iter()
            .map(|(sequence, _)| sequence)
            .max()
            .unwrap_or(0))
    }

    pub fn count(&self, run_id: &RunId) -> Result<usize> {
        Ok(self.entries(run_id)?.len())
    }

    /// Open a lazy, ordered, restartable view of the run's events.
    pub fn read(&self, run_id: &RunId, filter: EventFilter) -> Result<EventStream> {
        Ok(EventStream::new(run_id.clone(), self.entries(run_id)?, filter))
    }

    /// Merge every per-event file into `events.jsonl`, one event per line in
    /// sequence order.
    ///
    /// The artifact is rewritten atomically and only when its content changes,
    /// so calling this repeatedly without new events leaves it byte-for-byte
    /// identical.
    pub fn consolidate(&self, run_id: &RunId) -> Result<ConsolidationReport> {
        if !self.layout.run_dir(run_id).exists() {
            return Err(RunwayError::RunNotFound(run_id.to_string()));
        }
        let path = self.layout.consolidated_file(run_id);

        let stream = self.read(run_id, EventFilter::default())?;
        let mut content = Vec::new();
        let mut count = 0usize;
        for event in &stream {
            let event = event?;
            let line =
                serde_json::to_vec(&event).map_err(|e| RunwayError::serialization(&path, e))?;
            content.extend_from_slice(&line);
            content.push(b'\n');
            count += 1;
        }

        let digest = format!("{:x}", Sha256::digest(&content));
        let unchanged = fs::read(&path).is_ok_and(|existing| existing == content);
        if !unchanged {
            store::atomic_write(&path, &content)?;
        }

        info!(
            run_id = %run_id,
            events = count,
            changed = !unchanged,
            "consolidated event log"
        );

        Ok(ConsolidationReport {
            events_consolidated: count,
            path,
            digest,
            changed: !unchanged,
        })
    }

    /// Remove events appended by a transition that failed to commit.
    ///
    /// Only valid for the newest events of the run, by the writer that holds
    /// the run's lock.
    pub(crate) fn retract(&self, run_id: &RunId, events: &[Event]) -> Result<()> {
        for event in events.iter().rev() {
            store::remove_file_if_exists(&self.layout.event_file(run_id, event.sequence))?;
        }
        Ok(())
    }

    /// Delete the run's event files and consolidated artifact.
    pub fn purge(&self, run_id: &RunId) -> Result<()> {
        store::remove_dir_if_exists(&self.layout.events_dir(run_id))?;
        store::remove_file_if_exists(&self.layout.consolidated_file(run_id))
    }

    /// Committed event files for the run as `(sequence, path)`, unordered.
    fn entries(&self, run_id: &RunId) -> Result<Vec<(u64, PathBuf)>> {
        let dir = self.layout.events_dir(run_id);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RunwayError::storage(&dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| RunwayError::storage(&dir, e))?;
            let path = entry.path();
            let sequence = path
                .extension()
                .filter(|ext| *ext == "json")
                .and_then(|_| path.file_stem())
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok());
            if let Some(sequence) = sequence {
                entries.push((sequence, path));
            }
        }
        Ok(entries)
    }
}

pub(crate) fn validate_draft(draft: &EventDraft) -> Result<EventType> {
    let raw = draft
        .event_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RunwayError::Validation("event type is required".to_string()))?;
    if !EVENT_TYPE_RE.is_match(raw) {
        return Err(RunwayError::Validation(format!(
            "event type '{}' must be snake_case (lowercase letters, digits, '_')",
            raw
        )));
    }
    for artifact in &draft.artifacts {
        if artifact.name.trim().is_empty() {
            return Err(RunwayError::Validation(
                "artifact name must not be empty".to_string(),
            ));
        }
        if artifact.path.is_none() && artifact.url.is_none() {
            return Err(RunwayError::Validation(format!(
                "artifact '{}' needs a path or a url",
                artifact.name
            )));
        }
    }
    if let Some(error) = &draft.error {
        if error.code.trim().is_empty() {
            return Err(RunwayError::Validation(
                "error code must not be empty".to_string(),
            ));
        }
    }
    Ok(EventType::from(raw))
}
