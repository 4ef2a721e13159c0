//! The phase state machine.
//!
//! Every transition follows the same shape: load the run, check the status
//! permits the operation, mutate the in-memory record, then hand the record and
//! the events describing the change to the journal, which persists them.

use chrono::Utc;
use runway_common::{
    AutonomyLevel, EventDraft, EventError, EventType, PhaseName, PhaseReport, PhaseStatus, Run,
    RunId, RunStatus,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::Journal;
use crate::checkpoint::CheckpointStore;
use crate::errors::{Result, RunwayError};
use crate::events::EventLog;
use crate::provider::WorkItemProvider;
use crate::registry::{RunRegistry, RunView};
use crate::store::StoreLayout;
use crate::workflow::{AutonomyPolicy, WorkflowCatalog};

/// Metadata `reason` on `workflow_paused` when an autonomy gate paused the run.
pub const REASON_AUTONOMY_GATE: &str = "autonomy_gate";
/// Metadata `reason` on `workflow_paused` for an explicit pause.
pub const REASON_MANUAL: &str = "manual";

/// Parameters for [`WorkflowEngine::start`].
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub organization: String,
    pub project: String,
    pub workflow_id: String,
    pub work_item_id: Option<String>,
    /// Falls back to the engine's default autonomy level.
    pub autonomy: Option<AutonomyLevel>,
}

pub struct WorkflowEngine {
    journal: Journal,
    catalog: WorkflowCatalog,
    policy: AutonomyPolicy,
    default_autonomy: AutonomyLevel,
    provider: Option<Arc<dyn WorkItemProvider>>,
}

impl WorkflowEngine {
    pub fn new(layout: StoreLayout, catalog: WorkflowCatalog, policy: AutonomyPolicy) -> Self {
        Self {
            journal: Journal::new(layout),
            catalog,
            policy,
            default_autonomy: AutonomyLevel::default(),
            provider: None,
        }
    }

    pub fn with_default_autonomy(mut self, autonomy: AutonomyLevel) -> Self {
        self.default_autonomy = autonomy;
        self
    }

    pub fn with_provider(mut self, provider: Option<Arc<dyn WorkItemProvider>>) -> Self {
        self.provider = provider;
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.journal.registry
    }

    pub fn events(&self) -> &EventLog {
        &self.journal.events
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.journal.checkpoints
    }

    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    pub fn policy(&self) -> &AutonomyPolicy {
        &self.policy
    }

    /// Create a run and enter its first phase.
    pub fn start(&self, request: StartRequest) -> Result<Run> {
        let workflow = self.catalog.get(&request.workflow_id)?;
        let run_id = RunId::generate(&request.organization, &request.project)?;
        let autonomy = request.autonomy.unwrap_or(self.default_autonomy);

        let mut run = Run::new(
            run_id,
            &workflow.id,
            request.work_item_id.clone(),
            autonomy,
            workflow.max_retries,
            &workflow.phases,
        );
        self.enrich(&mut run);

        let first = run.first_phase().ok_or_else(|| {
            RunwayError::Configuration(format!("workflow '{}' has no phases", workflow.id))
        })?;
        run.status = RunStatus::InProgress;
        enter_phase(&mut run, first);

        let mut started = EventDraft::new(EventType::WorkflowStarted)
            .status(RunStatus::InProgress.as_str())
            .meta("workflow_id", workflow.id.as_str())
            .meta("autonomy_level", autonomy.as_str())
            .meta("max_retries", workflow.max_retries);
        if let Some(work_item) = &request.work_item_id {
            started = started.meta("work_item_id", work_item.as_str());
        }
        let drafts = vec![started, phase_started(first, 0)];
        self.journal.commit(&mut run, drafts, true)?;

        info!(
            run_id = %run.run_id,
            workflow = %run.workflow_id,
            autonomy = %autonomy,
            phase = %first,
            "started run"
        );
        Ok(run)
    }

    /// Apply the outcome of the current phase.
    pub fn advance(&self, run_id: &RunId, report: PhaseReport) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        if run.status != RunStatus::InProgress {
            return Err(RunwayError::invalid_state(run_id, run.status, "advance"));
        }
        let phase = current_phase(&run)?;

        let drafts = match report {
            PhaseReport::Completed => self.complete_phase(&mut run, phase),
            PhaseReport::NoGo { reason } => {
                if phase != PhaseName::Evaluate {
                    return Err(RunwayError::Validation(format!(
                        "only evaluate can report no_go; current phase is {}",
                        phase
                    )));
                }
                self.reject_build(&mut run, reason)
            }
            PhaseReport::Failed { error } => fail_run(&mut run, error, true),
        };

        self.journal.commit(&mut run, drafts, true)?;
        info!(
            run_id = %run_id,
            phase = %phase,
            status = %run.status,
            next = ?run.current_phase,
            "advanced run"
        );
        Ok(run)
    }

    /// Mark the run failed on behalf of a caller (timeout, crash, operator).
    pub fn fail(&self, run_id: &RunId, error: EventError) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        if !run.status.is_active() {
            return Err(RunwayError::invalid_state(run_id, run.status, "fail"));
        }
        let drafts = fail_run(&mut run, error, false);
        self.journal.commit(&mut run, drafts, true)?;
        warn!(run_id = %run_id, phase = ?run.current_phase, "run failed");
        Ok(run)
    }

    /// Pause an in-progress run. Pausing a paused run changes nothing.
    pub fn pause(&self, run_id: &RunId) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        match run.status {
            RunStatus::Paused => return Ok(run),
            RunStatus::InProgress => {}
            status => return Err(RunwayError::invalid_state(run_id, status, "pause")),
        }

        run.status = RunStatus::Paused;
        let draft = EventDraft::new(EventType::WorkflowPaused)
            .maybe_phase(run.current_phase)
            .status(RunStatus::Paused.as_str())
            .meta("reason", REASON_MANUAL);
        self.journal.commit(&mut run, vec![draft], false)?;
        info!(run_id = %run_id, phase = ?run.current_phase, "paused run");
        Ok(run)
    }

    /// Continue a paused run. A pending autonomy gate is approved and its
    /// deferred transition performed; otherwise the current phase continues.
    pub fn resume(&self, run_id: &RunId) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        if run.status != RunStatus::Paused {
            return Err(RunwayError::invalid_state(run_id, run.status, "resume"));
        }

        run.status = RunStatus::InProgress;
        let gate = run.pending_gate.take();
        let mut drafts = vec![
            EventDraft::new(EventType::WorkflowResumed)
                .maybe_phase(gate.or(run.current_phase))
                .status(RunStatus::InProgress.as_str())
                .meta("approved_gate", gate.is_some()),
        ];

        let checkpoint = match gate {
            Some(gated) => {
                proceed_after(&mut run, gated, &mut drafts);
                true
            }
            None => {
                let phase = current_phase(&run)?;
                if run.phase(phase).is_some_and(|p| p.status != PhaseStatus::InProgress) {
                    let attempt = run.phase(phase).map(|p| p.retry_count).unwrap_or(0);
                    enter_phase(&mut run, phase);
                    drafts.push(phase_started(phase, attempt));
                    true
                } else {
                    false
                }
            }
        };

        self.journal.commit(&mut run, drafts, checkpoint)?;
        info!(
            run_id = %run_id,
            gate = ?gate,
            status = %run.status,
            phase = ?run.current_phase,
            "resumed run"
        );
        Ok(run)
    }

    /// Stop a run for good.
    pub fn cancel(&self, run_id: &RunId) -> Result<Run> {
        let mut run = self.journal.registry.load(run_id)?;
        if run.status.is_terminal() {
            return Err(RunwayError::invalid_state(run_id, run.status, "cancel"));
        }
        let previous = run.status;
        run.status = RunStatus::Cancelled;
        run.pending_gate = None;
        let draft = EventDraft::new(EventType::WorkflowCancelled)
            .maybe_phase(run.current_phase)
            .status(RunStatus::Cancelled.as_str())
            .meta("previous_status", previous.as_str());
        self.journal.commit(&mut run, vec![draft], false)?;
        info!(run_id = %run_id, previous = %previous, "cancelled run");
        Ok(run)
    }

    /// Read-only projection of the run, optionally with its event count.
    pub fn status(&self, run_id: &RunId, include_events: bool) -> Result<RunView> {
        self.journal.registry.get(run_id, include_events)
    }

    /// Fetch the work item, if any, and record its title. Never fails the start.
    fn enrich(&self, run: &mut Run) {
        let (Some(provider), Some(work_item)) = (&self.provider, run.work_item_id.clone()) else {
            return;
        };
        match provider.fetch(&work_item) {
            Ok(item) => {
                run.metadata
                    .insert("work_item_title".to_string(), item.title.into());
                run.metadata.insert(
                    "work_item_provider".to_string(),
                    provider.kind().to_string().into(),
                );
            }
            Err(e) => {
                warn!(work_item = %work_item, error = %e, "could not enrich run from work item provider");
            }
        }
    }

    fn complete_phase(&self, run: &mut Run, phase: PhaseName) -> Vec<EventDraft> {
        let now = Utc::now();
        if let Some(record) = run.phase_mut(phase) {
            record.finish(PhaseStatus::Completed, now);
        }
        let mut drafts = vec![
            EventDraft::new(EventType::PhaseCompleted)
                .phase(phase)
                .status(PhaseStatus::Completed.as_str()),
        ];

        if self.policy.is_gate(run.autonomy_level, phase) {
            run.status = RunStatus::Paused;
            run.pending_gate = Some(phase);
            drafts.push(
                EventDraft::new(EventType::WorkflowPaused)
                    .phase(phase)
                    .status(RunStatus::Paused.as_str())
                    .meta("reason", REASON_AUTONOMY_GATE)
                    .meta("autonomy_level", run.autonomy_level.as_str()),
            );
        } else {
            proceed_after(run, phase, &mut drafts);
        }
        drafts
    }

    /// Evaluate said NO-GO: go back to build, or fail once retries run out.
    fn reject_build(&self, run: &mut Run, reason: Option<String>) -> Vec<EventDraft> {
        let now = Utc::now();
        let max_retries = run.max_retries;
        let retries = match run.phase_mut(PhaseName::Evaluate) {
            Some(record) => {
                record.retry_count += 1;
                record.finish(PhaseStatus::Failed, now);
                record.retry_count
            }
            None => max_retries,
        };

        let mut rejected = EventDraft::new(EventType::PhaseCompleted)
            .phase(PhaseName::Evaluate)
            .status("no_go")
            .meta("retry_count", retries)
            .meta("max_retries", max_retries);
        if let Some(reason) = &reason {
            rejected = rejected.message(reason.as_str());
        }
        let mut drafts = vec![rejected];

        if retries < max_retries && run.has_phase(PhaseName::Build) {
            if let Some(build) = run.phase_mut(PhaseName::Build) {
                build.retry_count += 1;
            }
            enter_phase(run, PhaseName::Build);
            drafts.push(
                EventDraft::new(EventType::PhaseRetried)
                    .phase(PhaseName::Build)
                    .meta("attempt", retries)
                    .meta("max_retries", max_retries),
            );
            drafts.push(phase_started(PhaseName::Build, retries));
        } else {
            run.status = RunStatus::Failed;
            let message = format!(
                "evaluate rejected the build {} time(s); retry limit {} reached",
                retries, max_retries
            );
            drafts.push(
                EventDraft::new(EventType::PhaseFailed)
                    .phase(PhaseName::Evaluate)
                    .status(PhaseStatus::Failed.as_str())
                    .message(message.as_str())
                    .error(EventError::new("max_retries_exceeded", &message, true)),
            );
            drafts.push(
                EventDraft::new(EventType::WorkflowFailed)
                    .phase(PhaseName::Evaluate)
                    .status(RunStatus::Failed.as_str())
                    .message(message.as_str()),
            );
        }
        drafts
    }
}

fn current_phase(run: &Run) -> Result<PhaseName> {
    run.current_phase.ok_or_else(|| {
        RunwayError::invalid_state(&run.run_id, run.status, "continue without a current phase")
    })
}

fn phase_started(phase: PhaseName, attempt: u32) -> EventDraft {
    EventDraft::new(EventType::PhaseStarted)
        .phase(phase)
        .status(PhaseStatus::InProgress.as_str())
        .meta("attempt", attempt)
}

fn enter_phase(run: &mut Run, phase: PhaseName) {
    run.current_phase = Some(phase);
    run.current_step = None;
    if let Some(record) = run.phase_mut(phase) {
        record.start(Utc::now());
    }
}

/// Move past `phase`: start the next phase or complete the run.
fn proceed_after(run: &mut Run, phase: PhaseName, drafts: &mut Vec<EventDraft>) {
    match run.next_phase_after(phase) {
        Some(next) => {
            let attempt = run.phase(next).map(|p| p.retry_count).unwrap_or(0);
            enter_phase(run, next);
            drafts.push(phase_started(next, attempt));
        }
        None => {
            run.status = RunStatus::Completed;
            run.current_step = None;
            drafts.push(
                EventDraft::new(EventType::WorkflowCompleted)
                    .phase(phase)
                    .status(RunStatus::Completed.as_str()),
            );
        }
    }
}

/// Mark the current phase and the run failed.
fn fail_run(run: &mut Run, error: EventError, with_phase_event: bool) -> Vec<EventDraft> {
    let now = Utc::now();
    let phase = run.current_phase;
    if let Some(record) = phase.and_then(|p| run.phase_mut(p)) {
        if record.status == PhaseStatus::InProgress {
            record.finish(PhaseStatus::Failed, now);
        }
    }
    run.status = RunStatus::Failed;
    run.pending_gate = None;

    let mut drafts = vec![
        EventDraft::new(EventType::Error)
            .maybe_phase(phase)
            .message(error.message.as_str())
            .error(error.clone()),
    ];
    if with_phase_event {
        drafts.push(
            EventDraft::new(EventType::PhaseFailed)
                .maybe_phase(phase)
                .status(PhaseStatus::Failed.as_str())
                .message(error.message.as_str()),
        );
    }
    drafts.push(
        EventDraft::new(EventType::WorkflowFailed)
            .maybe_phase(phase)
            .status(RunStatus::Failed.as_str())
            .message(error.message.as_str()),
    );
    drafts
}
