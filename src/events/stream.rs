//! Lazy, restartable reads over a run's event files.

use chrono::{DateTime, Utc};
use runway_common::{Event, EventType, PhaseName, RunId};
use std::path::PathBuf;

use crate::errors::Result;
use crate::store::read_json;

/// Criteria for [`crate::events::EventLog::read`]. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub phase: Option<PhaseName>,
    pub event_type: Option<EventType>,
    /// Inclusive lower bound on `timestamp`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `timestamp`.
    pub until: Option<DateTime<Utc>>,
    /// Only events with a sequence strictly greater than this.
    pub after_sequence: Option<u64>,
}

impl EventFilter {
    pub fn phase(mut self, phase: PhaseName) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn after_sequence(mut self, sequence: u64) -> Self {
        self.after_sequence = Some(sequence);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        if self.phase.is_some_and(|p| event.phase != Some(p)) {
            return false;
        }
        if self
            .event_type
            .as_ref()
            .is_some_and(|t| &event.event_type != t)
        {
            return false;
        }
        if self.since.is_some_and(|since| event.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.timestamp >= until) {
            return false;
        }
        if self
            .after_sequence
            .is_some_and(|after| event.sequence <= after)
        {
            return false;
        }
        true
    }
}

/// An ordered view over the events that existed when the stream was opened.
///
/// Files are read one at a time as the iterator advances. The stream can be
/// iterated any number of times; each pass starts again from the first event.
#[derive(Debug, Clone)]
pub struct EventStream {
    run_id: RunId,
    entries: Vec<(u64, PathBuf)>,
    filter: EventFilter,
}

impl EventStream {
    pub(crate) fn new(run_id: RunId, mut entries: Vec<(u64, PathBuf)>, filter: EventFilter) -> Self {
        entries.sort_by_key(|(sequence, _)| *sequence);
        Self {
            run_id,
            entries,
            filter,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Number of stored events the stream covers, before filtering.
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            stream: self,
            position: 0,
        }
    }

    /// Read every matching event, stopping at the first unreadable file.
    pub fn collect_events(&self) -> Result<Vec<Event>> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &'a EventStream {
    type Item = Result<Event>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct EventIter<'a> {
    stream: &'a EventStream,
    position: usize,
}

impl Iterator for EventIter<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((sequence, path)) = self.stream.entries.get(self.position) {
            self.position += 1;
            // Skip without touching the file when the sequence alone rules it out.
            if self
                .stream
                .filter
                .after_sequence
                .is_some_and(|after| *sequence <= after)
            {
                continue;
            }
            match read_json::<Event>(path) {
                Ok(event) if self.stream.filter.matches(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
