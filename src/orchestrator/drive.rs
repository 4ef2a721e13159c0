//! Drive loop: execute the current phase, feed the report back, repeat.
//!
//! The loop stops as soon as the run leaves `in_progress`: an autonomy gate
//! pauses it, it completes or fails, or another caller paused or cancelled it
//! while a phase was executing. A stop request pauses the run; when it arrives
//! while a phase executes, that phase's report is discarded and the phase stays
//! in progress for the next resume.

use runway_common::{
    EventDraft, EventType, PhaseContext, PhaseExecutor, PhaseName, PhaseReport, Run, RunId,
    RunStatus,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use super::WorkflowEngine;
use crate::errors::{Result, RunwayError};

#[derive(Debug, Clone, Default)]
pub struct DriveOptions {
    /// Stop after executing this many phases, leaving the run in progress.
    pub max_phases: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub run: Run,
    pub phases_executed: usize,
    /// The loop paused the run because a stop was requested.
    pub stopped: bool,
}

pub async fn drive(
    engine: &WorkflowEngine,
    executor: &dyn PhaseExecutor,
    run_id: &RunId,
    options: &DriveOptions,
    stop: &AtomicBool,
) -> Result<DriveOutcome> {
    let mut executed = 0usize;

    loop {
        let run = engine.registry().load(run_id)?;
        if run.status != RunStatus::InProgress {
            return Ok(DriveOutcome {
                run,
                phases_executed: executed,
                stopped: false,
            });
        }
        if stop.load(Ordering::SeqCst) {
            let run = engine.pause(run_id)?;
            info!(run_id = %run_id, "stop requested; paused run");
            return Ok(DriveOutcome {
                run,
                phases_executed: executed,
                stopped: true,
            });
        }
        if options.max_phases.is_some_and(|max| executed >= max) {
            return Ok(DriveOutcome {
                run,
                phases_executed: executed,
                stopped: false,
            });
        }

        let phase = run
            .current_phase
            .ok_or_else(|| RunwayError::invalid_state(run_id, run.status, "drive without a current phase"))?;
        let context = PhaseContext {
            run_id: run.run_id.clone(),
            workflow_id: run.workflow_id.clone(),
            phase,
            work_item_id: run.work_item_id.clone(),
            autonomy_level: run.autonomy_level,
            attempt: run.phase(phase).map(|p| p.retry_count).unwrap_or(0),
        };

        info!(run_id = %run_id, phase = %phase, attempt = context.attempt, "executing phase");
        let execution = executor.execute(&context).await;
        executed += 1;

        let mut completed = EventDraft::new(EventType::AgentCompleted)
            .phase(phase)
            .status(execution.report.as_str())
            .meta("duration_ms", execution.duration.as_millis() as u64)
            .meta("attempt", context.attempt);
        if let Some(code) = execution.exit_code {
            completed = completed.meta("exit_code", code);
        }
        if let Some(output) = &execution.output {
            completed = completed.message(output.as_str());
        }
        engine.events().append(run_id, completed)?;

        // An interrupt usually kills the phase command too; its report is not a verdict.
        if stop.load(Ordering::SeqCst) {
            let run = engine.pause(run_id)?;
            info!(run_id = %run_id, phase = %phase, "stop requested during phase; report discarded");
            return Ok(DriveOutcome {
                run,
                phases_executed: executed,
                stopped: true,
            });
        }

        let current = engine.registry().load(run_id)?;
        if current.status != RunStatus::InProgress || current.current_phase != Some(phase) {
            warn!(
                run_id = %run_id,
                phase = %phase,
                status = %current.status,
                "run changed while the phase executed; discarding report"
            );
            return Ok(DriveOutcome {
                run: current,
                phases_executed: executed,
                stopped: false,
            });
        }

        engine.advance(run_id, verdict(phase, execution.report))?;
    }
}

/// Only evaluate may reject the build; a NO-GO from any other phase fails it.
fn verdict(phase: PhaseName, report: PhaseReport) -> PhaseReport {
    match report {
        PhaseReport::NoGo { reason } if phase != PhaseName::Evaluate => PhaseReport::failed(
            "unexpected_no_go",
            &match reason {
                Some(reason) => format!("{} reported no_go: {}", phase, reason),
                None => format!("{} reported no_go", phase),
            },
        ),
        report => report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventFilter;
    use crate::orchestrator::StartRequest;
    use crate::store::StoreLayout;
    use crate::workflow::{AutonomyPolicy, WorkflowCatalog};
    use async_trait::async_trait;
    use crate::executor::CommandExecutor;
    use runway_common::{AutonomyLevel, PhaseExecution, PhaseStatus};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    /// Returns scripted reports for evaluate, completes everything else.
    struct Scripted {
        evaluate: Mutex<Vec<PhaseReport>>,
        seen: Mutex<Vec<PhaseName>>,
    }

    impl Scripted {
        fn new(mut evaluate: Vec<PhaseReport>) -> Self {
            evaluate.reverse();
            Self {
                evaluate: Mutex::new(evaluate),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PhaseExecutor for Scripted {
        async fn execute(&self, context: &PhaseContext) -> PhaseExecution {
            self.seen.lock().unwrap().push(context.phase);
            let report = if context.phase == PhaseName::Evaluate {
                self.evaluate
                    .lock()
                    .unwrap()
                    .pop()
                    .unwrap_or(PhaseReport::Completed)
            } else {
                PhaseReport::Completed
            };
            let mut execution = PhaseExecution::new(report, Duration::from_millis(3));
            execution.exit_code = Some(0);
            execution
        }
    }

    fn setup(autonomy: AutonomyLevel) -> (WorkflowEngine, RunId, TempDir) {
        let dir = tempdir().expect("failed to create temp dir");
        let engine = WorkflowEngine::new(
            StoreLayout::new(dir.path()),
            WorkflowCatalog::default(),
            AutonomyPolicy::default(),
        );
        let run = engine
            .start(StartRequest {
                organization: "acme".to_string(),
                project: "billing".to_string(),
                workflow_id: "sdlc".to_string(),
                work_item_id: None,
                autonomy: Some(autonomy),
            })
            .unwrap();
        (engine, run.run_id, dir)
    }

    #[tokio::test]
    async fn test_drive_autonomous_run_to_completion() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let executor = Scripted::new(Vec::new());
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(outcome.phases_executed, 5);

        let agent_events = engine
            .events()
            .read(
                &run_id,
                EventFilter::default().event_type(EventType::AgentCompleted),
            )
            .unwrap()
            .collect_events()
            .unwrap();
        assert_eq!(agent_events.len(), 5);
        assert_eq!(agent_events[0].metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_drive_retries_build_after_no_go() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let executor = Scripted::new(vec![PhaseReport::NoGo { reason: None }]);
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Completed);
        assert_eq!(
            *executor.seen.lock().unwrap(),
            vec![
                PhaseName::Frame,
                PhaseName::Architect,
                PhaseName::Build,
                PhaseName::Evaluate,
                PhaseName::Build,
                PhaseName::Evaluate,
                PhaseName::Release,
            ]
        );
    }

    #[tokio::test]
    async fn test_drive_stops_at_autonomy_gate() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Guarded);
        let executor = Scripted::new(Vec::new());
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Paused);
        assert_eq!(outcome.run.pending_gate, Some(PhaseName::Architect));
        assert_eq!(outcome.phases_executed, 2);
    }

    #[tokio::test]
    async fn test_stop_request_pauses_between_phases() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let executor = Scripted::new(Vec::new());
        let stop = AtomicBool::new(true);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.run.status, RunStatus::Paused);
        assert_eq!(outcome.phases_executed, 0);
    }

    /// Raises the stop flag while "executing", then reports a failure.
    struct Interrupted<'a> {
        stop: &'a AtomicBool,
    }

    #[async_trait]
    impl PhaseExecutor for Interrupted<'_> {
        async fn execute(&self, _context: &PhaseContext) -> PhaseExecution {
            self.stop.store(true, Ordering::SeqCst);
            let mut execution = PhaseExecution::new(
                PhaseReport::failed("command_failed", "phase command exited with code 130"),
                Duration::from_millis(1),
            );
            execution.exit_code = Some(130);
            execution
        }
    }

    #[tokio::test]
    async fn test_stop_during_phase_discards_report() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let stop = AtomicBool::new(false);
        let executor = Interrupted { stop: &stop };

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert!(outcome.stopped);
        assert_eq!(outcome.phases_executed, 1);
        assert_eq!(outcome.run.status, RunStatus::Paused);
        assert_eq!(outcome.run.current_phase, Some(PhaseName::Frame));
        assert_eq!(
            outcome.run.phase(PhaseName::Frame).unwrap().status,
            runway_common::PhaseStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_exit_two_in_frame_fails_the_run() {
        let (engine, run_id, dir) = setup(AutonomyLevel::Autonomous);
        let executor = CommandExecutor::new("exit 2", dir.path());
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.phases_executed, 1);
        assert_eq!(outcome.run.status, RunStatus::Failed);
        assert_eq!(
            outcome.run.phase(PhaseName::Frame).unwrap().status,
            PhaseStatus::Failed
        );

        let types: Vec<String> = engine
            .events()
            .read(&run_id, EventFilter::default())
            .unwrap()
            .collect_events()
            .unwrap()
            .into_iter()
            .map(|e| e.event_type.to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "workflow_started",
                "phase_started",
                "agent_completed",
                "error",
                "phase_failed",
                "workflow_failed",
            ]
        );
    }

    /// Reports NO-GO from whatever phase it is asked to run.
    struct AlwaysNoGo;

    #[async_trait]
    impl PhaseExecutor for AlwaysNoGo {
        async fn execute(&self, _context: &PhaseContext) -> PhaseExecution {
            PhaseExecution::new(
                PhaseReport::NoGo {
                    reason: Some("not ready".to_string()),
                },
                Duration::from_millis(1),
            )
        }
    }

    #[tokio::test]
    async fn test_no_go_outside_evaluate_fails_instead_of_erroring() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &AlwaysNoGo, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Failed);

        let errors = engine
            .events()
            .read(&run_id, EventFilter::default().event_type(EventType::Error))
            .unwrap()
            .collect_events()
            .unwrap();
        let error = errors[0].error.as_ref().unwrap();
        assert_eq!(error.code, "unexpected_no_go");
        assert!(error.message.contains("frame reported no_go: not ready"));
    }

    #[test]
    fn test_verdict_keeps_evaluate_no_go() {
        let no_go = PhaseReport::NoGo { reason: None };
        assert_eq!(verdict(PhaseName::Evaluate, no_go.clone()), no_go);
        assert_eq!(
            verdict(PhaseName::Build, PhaseReport::Completed),
            PhaseReport::Completed
        );
        assert!(matches!(
            verdict(PhaseName::Release, no_go),
            PhaseReport::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn test_max_phases_leaves_run_in_progress() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        let executor = Scripted::new(Vec::new());
        let stop = AtomicBool::new(false);
        let options = DriveOptions {
            max_phases: Some(2),
        };

        let outcome = drive(&engine, &executor, &run_id, &options, &stop)
            .await
            .unwrap();
        assert_eq!(outcome.phases_executed, 2);
        assert_eq!(outcome.run.status, RunStatus::InProgress);
        assert_eq!(outcome.run.current_phase, Some(PhaseName::Build));
    }

    #[tokio::test]
    async fn test_drive_on_finished_run_does_nothing() {
        let (engine, run_id, _dir) = setup(AutonomyLevel::Autonomous);
        engine.cancel(&run_id).unwrap();
        let executor = Scripted::new(Vec::new());
        let stop = AtomicBool::new(false);

        let outcome = drive(&engine, &executor, &run_id, &DriveOptions::default(), &stop)
            .await
            .unwrap();
        assert_eq!(outcome.run.status, RunStatus::Cancelled);
        assert!(executor.seen.lock().unwrap().is_empty());
    }
}
