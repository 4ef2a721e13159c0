//! Run orchestration: the phase state machine, recovery, and the executor drive loop.

pub mod drive;
pub mod engine;
pub mod recovery;

pub use drive::{DriveOptions, DriveOutcome, drive};
pub use engine::{StartRequest, WorkflowEngine};
pub use recovery::{RecoveryEngine, RecoveryTarget};

use runway_common::{Event, EventDraft, Run};
use tracing::{debug, warn};

use crate::checkpoint::CheckpointStore;
use crate::errors::{Result, RunwayError};
use crate::events::{EventLog, validate_draft};
use crate::registry::RunRegistry;
use crate::store::StoreLayout;

/// Metadata key linking a boundary event to the checkpoint taken with it.
pub const CHECKPOINT_META_KEY: &str = "checkpoint_id";

/// Commits a transition: checkpoint, then events, then the registry record.
///
/// The registry write comes last so the record never runs ahead of the events
/// that justify it. Drafts are validated before anything is written, and a
/// failed write removes what the transition already wrote, so a retry starts
/// from the last committed state. Only a crash part-way through can leave
/// orphaned checkpoint or event files behind the registry record.
#[derive(Debug, Clone)]
pub(crate) struct Journal {
    pub(crate) layout: StoreLayout,
    pub(crate) registry: RunRegistry,
    pub(crate) events: EventLog,
    pub(crate) checkpoints: CheckpointStore,
}

impl Journal {
    pub(crate) fn new(layout: StoreLayout) -> Self {
        Self {
            registry: RunRegistry::new(layout.clone()),
            events: EventLog::new(layout.clone()),
            checkpoints: CheckpointStore::new(layout.clone()),
            layout,
        }
    }

    pub(crate) fn commit(
        &self,
        run: &mut Run,
        mut drafts: Vec<EventDraft>,
        checkpoint: bool,
    ) -> Result<Vec<Event>> {
        for draft in &drafts {
            validate_draft(draft)?;
        }
        run.touch();

        let mut captured = None;
        if checkpoint {
            let state = serde_json::to_value(&*run).map_err(|e| {
                RunwayError::serialization(self.layout.checkpoints_dir(&run.run_id), e)
            })?;
            let cp = self.checkpoints.capture(
                &run.run_id,
                run.current_phase,
                run.current_step.clone(),
                state,
            )?;
            if let Some(last) = drafts.last_mut() {
                last.metadata.insert(
                    CHECKPOINT_META_KEY.to_string(),
                    serde_json::Value::String(cp.checkpoint_id.clone()),
                );
            }
            captured = Some(cp.checkpoint_id);
        }

        let mut appended = Vec::with_capacity(drafts.len());
        let mut written = Ok(());
        for draft in drafts {
            match self.events.append(&run.run_id, draft) {
                Ok(event) => appended.push(event),
                Err(e) => {
                    written = Err(e);
                    break;
                }
            }
        }
        let written = written.and_then(|()| self.registry.upsert(run));

        if let Err(e) = written {
            self.roll_back(run, &appended, captured.as_deref());
            return Err(e);
        }

        debug!(
            run_id = %run.run_id,
            status = %run.status,
            phase = ?run.current_phase,
            events = appended.len(),
            "committed transition"
        );
        Ok(appended)
    }

    fn roll_back(&self, run: &Run, appended: &[Event], checkpoint_id: Option<&str>) {
        if let Err(e) = self.events.retract(&run.run_id, appended) {
            warn!(run_id = %run.run_id, error = %e, "could not retract events of failed transition");
        }
        if let Some(id) = checkpoint_id {
            if let Err(e) = self.checkpoints.discard(&run.run_id, id) {
                warn!(run_id = %run.run_id, checkpoint_id = id, error = %e, "could not discard checkpoint of failed transition");
            }
        }
        warn!(
            run_id = %run.run_id,
            events = appended.len(),
            "transition failed to commit; rolled back"
        );
    }
}
