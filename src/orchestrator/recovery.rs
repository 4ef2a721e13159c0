//! Recovery of failed or paused runs.
//!
//! Recovery never replays history. It rewrites the phase records to the chosen
//! starting point, re-enters that phase, and appends `workflow_recovered`.

use chrono::Utc;
use runway_common::{EventDraft, EventType, PhaseName, PhaseStatus, Run, RunId, RunStatus};
use serde_json::Value;
use tracing::info;

use super::Journal;
use crate::errors::{Result, RunwayError};
use crate::store::StoreLayout;

/// Where to restart a run from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryTarget {
    /// Restart at `from_phase`, marking `skip_phases` as skipped.
    Phase {
        from_phase: PhaseName,
        skip_phases: Vec<PhaseName>,
    },
    /// Restore the state captured in a checkpoint of this run.
    Checkpoint { checkpoint_id: String },
}

pub struct RecoveryEngine {
    journal: Journal,
}

impl RecoveryEngine {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            journal: Journal::new(layout),
        }
    }

    pub fn recover(&self, run_id: &RunId, target: RecoveryTarget) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        if !matches!(run.status, RunStatus::Failed | RunStatus::Paused) {
            return Err(RunwayError::invalid_state(run_id, run.status, "recover"));
        }
        let previous = run.status;

        let recovered = match &target {
            RecoveryTarget::Phase {
                from_phase,
                skip_phases,
            } => {
                validate_phase_target(&run, *from_phase, skip_phases)?;
                rewind_to_phase(&mut run, *from_phase, skip_phases);
                EventDraft::new(EventType::WorkflowRecovered)
                    .phase(*from_phase)
                    .meta("mode", "phase")
                    .meta("from_phase", from_phase.as_str())
                    .meta(
                        "skip_phases",
                        Value::from(
                            skip_phases
                                .iter()
                                .map(|p| p.as_str().to_string())
                                .collect::<Vec<_>>(),
                        ),
                    )
            }
            RecoveryTarget::Checkpoint { checkpoint_id } => {
                let checkpoint = self.journal.checkpoints.read_for_run(run_id, checkpoint_id)?;
                match serde_json::from_value::<Run>(checkpoint.state.clone()) {
                    Ok(snapshot) if snapshot.run_id == run.run_id => {
                        restore_snapshot(&mut run, snapshot)?;
                    }
                    _ => {
                        let phase = checkpoint.phase.ok_or_else(|| {
                            RunwayError::Validation(format!(
                                "checkpoint {} records neither run state nor a phase",
                                checkpoint_id
                            ))
                        })?;
                        validate_phase_target(&run, phase, &[])?;
                        rewind_to_phase(&mut run, phase, &[]);
                        run.current_step = checkpoint.step.clone();
                    }
                }
                EventDraft::new(EventType::WorkflowRecovered)
                    .maybe_phase(run.current_phase)
                    .meta("mode", "checkpoint")
                    .meta("checkpoint_id", checkpoint_id.as_str())
            }
        };

        run.status = RunStatus::InProgress;
        run.pending_gate = None;
        let phase = run.current_phase;
        let mut drafts = vec![
            recovered
                .status(RunStatus::InProgress.as_str())
                .meta("previous_status", previous.as_str()),
        ];
        if let Some(phase) = phase {
            let mut started = EventDraft::new(EventType::PhaseStarted)
                .phase(phase)
                .status(PhaseStatus::InProgress.as_str())
                .meta("attempt", 0);
            if let Some(step) = &run.current_step {
                started = started.step(step.as_str());
            }
            drafts.push(started);
        }
        self.journal.commit(&mut run, drafts, true)?;

        info!(
            run_id = %run_id,
            previous = %previous,
            phase = ?run.current_phase,
            target = ?target,
            "recovered run"
        );
        Ok(run)
    }
}

fn validate_phase_target(run: &Run, from_phase: PhaseName, skip_phases: &[PhaseName]) -> Result<()> {
    if !run.has_phase(from_phase) {
        return Err(RunwayError::Validation(format!(
            "phase {} is not part of workflow '{}'",
            from_phase, run.workflow_id
        )));
    }
    if skip_phases.contains(&from_phase) {
        return Err(RunwayError::Validation(format!(
            "cannot recover from phase {} while skipping it",
            from_phase
        )));
    }
    if let Some(unknown) = skip_phases.iter().find(|p| !run.has_phase(**p)) {
        return Err(RunwayError::Validation(format!(
            "skip phase {} is not part of workflow '{}'",
            unknown, run.workflow_id
        )));
    }
    Ok(())
}

/// Rewrite phase records so the run restarts at `from_phase`.
fn rewind_to_phase(run: &mut Run, from_phase: PhaseName, skip_phases: &[PhaseName]) {
    for record in run.phases.iter_mut() {
        if skip_phases.contains(&record.phase) {
            record.reset();
            record.status = PhaseStatus::Skipped;
        } else if record.phase < from_phase {
            if record.status != PhaseStatus::Completed {
                record.status = PhaseStatus::Skipped;
            }
        } else {
            record.reset();
        }
    }
    run.current_phase = Some(from_phase);
    run.current_step = None;
    if let Some(record) = run.phase_mut(from_phase) {
        record.start(Utc::now());
    }
}

/// Restore phase records and position from a snapshot of this run, then
/// re-enter the snapshot's current phase.
fn restore_snapshot(run: &mut Run, snapshot: Run) -> Result<()> {
    run.phases = snapshot.phases;
    run.current_step = snapshot.current_step;
    let phase = snapshot
        .current_phase
        .or_else(|| run.first_phase())
        .ok_or_else(|| {
            RunwayError::Validation("checkpoint snapshot has no phases to resume".to_string())
        })?;
    run.current_phase = Some(phase);

    let now = Utc::now();
    for record in run.phases.iter_mut() {
        record.retry_count = 0;
        if record.phase == phase {
            record.start(now);
        } else if record.phase > phase && record.status != PhaseStatus::Skipped {
            record.reset();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointStore;
    use crate::events::EventFilter;
    use crate::orchestrator::{StartRequest, WorkflowEngine};
    use crate::workflow::{AutonomyPolicy, WorkflowCatalog};
    use runway_common::{AutonomyLevel, EventError, PhaseReport};
    use tempfile::{TempDir, tempdir};

    fn setup() -> (WorkflowEngine, RecoveryEngine, TempDir) {
        let dir = tempdir().expect("failed to create temp dir");
        let layout = StoreLayout::new(dir.path());
        let engine = WorkflowEngine::new(
            layout.clone(),
            WorkflowCatalog::default(),
            AutonomyPolicy::default(),
        );
        (engine, RecoveryEngine::new(layout), dir)
    }

    fn start(engine: &WorkflowEngine) -> Run {
        engine
            .start(StartRequest {
                organization: "acme".to_string(),
                project: "billing".to_string(),
                workflow_id: "sdlc".to_string(),
                work_item_id: None,
                autonomy: Some(AutonomyLevel::Autonomous),
            })
            .unwrap()
    }

    /// Drive to build and fail there.
    fn failed_in_build(engine: &WorkflowEngine) -> Run {
        let run = start(engine);
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        engine
            .advance(&run.run_id, PhaseReport::failed("compile_error", "does not build"))
            .unwrap()
    }

    #[test]
    fn test_recover_from_phase_with_skips() {
        let (engine, recovery, _dir) = setup();
        let run = start(&engine);
        engine
            .fail(&run.run_id, EventError::new("timeout", "frame timed out", true))
            .unwrap();

        let recovered = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Phase {
                    from_phase: PhaseName::Build,
                    skip_phases: vec![PhaseName::Release],
                },
            )
            .unwrap();

        assert_eq!(recovered.status, RunStatus::InProgress);
        assert_eq!(recovered.current_phase, Some(PhaseName::Build));
        let status = |p| recovered.phase(p).unwrap().status;
        assert_eq!(status(PhaseName::Frame), PhaseStatus::Skipped);
        assert_eq!(status(PhaseName::Architect), PhaseStatus::Skipped);
        assert_eq!(status(PhaseName::Build), PhaseStatus::InProgress);
        assert_eq!(status(PhaseName::Evaluate), PhaseStatus::Pending);
        assert_eq!(status(PhaseName::Release), PhaseStatus::Skipped);

        let recovered_event = engine
            .events()
            .read(
                &run.run_id,
                EventFilter::default().event_type(EventType::WorkflowRecovered),
            )
            .unwrap()
            .collect_events()
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(recovered_event.phase, Some(PhaseName::Build));
        assert_eq!(recovered_event.metadata["skip_phases"][0], "release");

        // evaluate completes the run because release is skipped
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        let done = engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        assert_eq!(done.status, RunStatus::Completed);
    }

    #[test]
    fn test_recover_keeps_completed_earlier_phases() {
        let (engine, recovery, _dir) = setup();
        let run = failed_in_build(&engine);
        let recovered = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Phase {
                    from_phase: PhaseName::Build,
                    skip_phases: Vec::new(),
                },
            )
            .unwrap();
        assert_eq!(
            recovered.phase(PhaseName::Frame).unwrap().status,
            PhaseStatus::Completed
        );
        assert_eq!(
            recovered.phase(PhaseName::Build).unwrap().status,
            PhaseStatus::InProgress
        );
    }

    #[test]
    fn test_recover_rejects_invalid_phase_targets() {
        let (engine, recovery, _dir) = setup();
        let run = failed_in_build(&engine);

        let err = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Phase {
                    from_phase: PhaseName::Build,
                    skip_phases: vec![PhaseName::Build],
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_eq!(
            engine.status(&run.run_id, false).unwrap().run.status,
            RunStatus::Failed
        );
    }

    #[test]
    fn test_recover_rejects_phase_outside_workflow() {
        let (engine, recovery, _dir) = setup();
        let run = engine
            .start(StartRequest {
                organization: "acme".to_string(),
                project: "billing".to_string(),
                workflow_id: "hotfix".to_string(),
                work_item_id: None,
                autonomy: Some(AutonomyLevel::Autonomous),
            })
            .unwrap();
        engine.pause(&run.run_id).unwrap();
        let err = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Phase {
                    from_phase: PhaseName::Architect,
                    skip_phases: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, RunwayError::Validation(_)));
    }

    #[test]
    fn test_recover_requires_failed_or_paused() {
        let (engine, recovery, _dir) = setup();
        let run = start(&engine);
        let target = RecoveryTarget::Phase {
            from_phase: PhaseName::Frame,
            skip_phases: Vec::new(),
        };
        let err = recovery.recover(&run.run_id, target.clone()).unwrap_err();
        assert!(matches!(err, RunwayError::InvalidState { .. }));

        engine.cancel(&run.run_id).unwrap();
        let err = recovery.recover(&run.run_id, target).unwrap_err();
        assert_eq!(err.code(), "invalid_state");
    }

    #[test]
    fn test_recover_from_checkpoint_restores_snapshot() {
        let (engine, recovery, _dir) = setup();
        let run = start(&engine);
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        // Checkpoint taken entering architect.
        let at_architect = engine.checkpoints().latest(&run.run_id).unwrap().unwrap();
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        engine
            .advance(&run.run_id, PhaseReport::failed("compile_error", "boom"))
            .unwrap();

        let recovered = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Checkpoint {
                    checkpoint_id: at_architect.checkpoint_id.clone(),
                },
            )
            .unwrap();
        assert_eq!(recovered.status, RunStatus::InProgress);
        assert_eq!(recovered.current_phase, Some(PhaseName::Architect));
        assert_eq!(
            recovered.phase(PhaseName::Frame).unwrap().status,
            PhaseStatus::Completed
        );
        assert_eq!(
            recovered.phase(PhaseName::Build).unwrap().status,
            PhaseStatus::Pending
        );

        let last_recovery = engine
            .events()
            .read(
                &run.run_id,
                EventFilter::default().event_type(EventType::WorkflowRecovered),
            )
            .unwrap()
            .collect_events()
            .unwrap()
            .pop()
            .unwrap();
        assert_eq!(
            last_recovery.metadata["checkpoint_id"],
            at_architect.checkpoint_id.as_str()
        );
    }

    #[test]
    fn test_recover_from_phase_only_checkpoint() {
        let (engine, recovery, dir) = setup();
        let run = failed_in_build(&engine);
        let store = CheckpointStore::new(StoreLayout::new(dir.path()));
        let cp = store
            .capture(
                &run.run_id,
                Some(PhaseName::Architect),
                Some("draft-adr".to_string()),
                serde_json::json!({"notes": "external snapshot"}),
            )
            .unwrap();

        let recovered = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Checkpoint {
                    checkpoint_id: cp.checkpoint_id,
                },
            )
            .unwrap();
        assert_eq!(recovered.current_phase, Some(PhaseName::Architect));
        assert_eq!(recovered.current_step.as_deref(), Some("draft-adr"));
    }

    #[test]
    fn test_recover_from_foreign_checkpoint_is_not_found() {
        let (engine, recovery, _dir) = setup();
        let run = failed_in_build(&engine);
        let other = start(&engine);
        let foreign = engine.checkpoints().latest(&other.run_id).unwrap().unwrap();

        let err = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Checkpoint {
                    checkpoint_id: foreign.checkpoint_id,
                },
            )
            .unwrap_err();
        assert!(matches!(err, RunwayError::CheckpointNotFound(_)));

        let err = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Checkpoint {
                    checkpoint_id: "cp_missing".to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_recovery_resets_retry_counters() {
        let (engine, recovery, _dir) = setup();
        let run = start(&engine);
        for _ in 0..3 {
            engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        }
        engine
            .advance(&run.run_id, PhaseReport::NoGo { reason: None })
            .unwrap();
        engine.advance(&run.run_id, PhaseReport::Completed).unwrap();
        let failed = engine
            .advance(&run.run_id, PhaseReport::NoGo { reason: None })
            .unwrap();
        assert_eq!(failed.status, RunStatus::Failed);

        let recovered = recovery
            .recover(
                &run.run_id,
                RecoveryTarget::Phase {
                    from_phase: PhaseName::Build,
                    skip_phases: Vec::new(),
                },
            )
            .unwrap();
        assert!(recovered.phases.iter().all(|p| p.retry_count == 0));
    }
}
