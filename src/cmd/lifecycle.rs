//! Run state transitions: `runway start|advance|fail|pause|resume|cancel|recover`.

use anyhow::{Context, Result, bail};
use console::style;
use runway::orchestrator::{RecoveryTarget, StartRequest};
use runway::ui::icons::{GATE, SPARKLE};
use runway::ui::report::status_icon;
use runway_common::{AutonomyLevel, EventError, PhaseName, PhaseReport, Run};

use super::Session;

/// Print the run after a transition.
fn report(session: &Session, run: &Run, verb: &str) -> Result<()> {
    if session.json {
        return session.print_json(run);
    }
    let phase = run
        .current_phase
        .map(|p| format!(" at {}", style(p).yellow()))
        .unwrap_or_default();
    println!(
        "{}{} {} ({}{})",
        status_icon(run.status),
        verb,
        style(run.run_id.to_string()).bold(),
        run.status,
        phase
    );
    if let Some(gate) = run.pending_gate {
        println!(
            "{}{} completed; approve with 'runway resume {}'",
            GATE, gate, run.run_id
        );
    }
    Ok(())
}

pub fn cmd_start(
    session: &Session,
    workflow: &str,
    work_item: Option<String>,
    autonomy: Option<&str>,
) -> Result<()> {
    let autonomy = autonomy
        .map(|value| value.parse::<AutonomyLevel>())
        .transpose()
        .context("Invalid --autonomy value")?;

    let engine = session.engine()?;
    let run = engine.start(StartRequest {
        organization: session.config.organization.clone(),
        project: session.config.project.clone(),
        workflow_id: workflow.to_string(),
        work_item_id: work_item,
        autonomy,
    })?;

    if !session.json {
        println!("{}Started run", SPARKLE);
    }
    report(session, &run, "Run")
}

pub fn parse_report(
    outcome: &str,
    reason: Option<String>,
    code: Option<&str>,
) -> Result<PhaseReport> {
    match outcome.to_lowercase().replace('_', "-").as_str() {
        "completed" | "go" => Ok(PhaseReport::Completed),
        "no-go" | "nogo" => Ok(PhaseReport::NoGo { reason }),
        "failed" => Ok(PhaseReport::failed(
            code.unwrap_or("phase_failed"),
            reason.as_deref().unwrap_or("phase failed"),
        )),
        other => bail!(
            "Invalid outcome '{}'. Valid values: completed, no-go, failed",
            other
        ),
    }
}

pub fn cmd_advance(
    session: &Session,
    run: Option<&str>,
    outcome: &str,
    reason: Option<String>,
    code: Option<&str>,
) -> Result<()> {
    let phase_report = parse_report(outcome, reason, code)?;
    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let run = session.engine()?.advance(&run_id, phase_report)?;
    report(session, &run, "Advanced")
}

pub fn cmd_fail(
    session: &Session,
    run: Option<&str>,
    code: &str,
    message: &str,
    recoverable: bool,
) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let run = session
        .engine()?
        .fail(&run_id, EventError::new(code, message, recoverable))?;
    report(session, &run, "Failed")
}

pub fn cmd_pause(session: &Session, run: Option<&str>) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let run = session.engine()?.pause(&run_id)?;
    report(session, &run, "Paused")
}

pub fn cmd_resume(session: &Session, run: Option<&str>) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let run = session.engine()?.resume(&run_id)?;
    report(session, &run, "Resumed")
}

pub fn cmd_cancel(session: &Session, run: Option<&str>) -> Result<()> {
    use dialoguer::Confirm;

    let run_id = session.resolve_run(run)?;
    if session.interactive() {
        let confirmed = Confirm::new()
            .with_prompt(format!("Cancel run {}? This cannot be undone", run_id))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let _lock = session.lock(&run_id)?;
    let run = session.engine()?.cancel(&run_id)?;
    report(session, &run, "Cancelled")
}

pub fn cmd_recover(
    session: &Session,
    run: Option<&str>,
    from_phase: Option<&str>,
    skip: &[String],
    checkpoint: Option<&str>,
) -> Result<()> {
    let target = match (from_phase, checkpoint) {
        (Some(phase), None) => RecoveryTarget::Phase {
            from_phase: phase
                .parse::<PhaseName>()
                .with_context(|| format!("Invalid --from-phase '{}'", phase))?,
            skip_phases: skip
                .iter()
                .map(|p| {
                    p.trim()
                        .parse::<PhaseName>()
                        .with_context(|| format!("Invalid --skip phase '{}'", p))
                })
                .collect::<Result<Vec<_>>>()?,
        },
        (None, Some(id)) => RecoveryTarget::Checkpoint {
            checkpoint_id: id.to_string(),
        },
        _ => bail!("Pass exactly one of --from-phase or --checkpoint"),
    };

    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let run = session.recovery().recover(&run_id, target)?;
    report(session, &run, "Recovered")
}
