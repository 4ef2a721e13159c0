//! Phase execution loop: `runway drive`.

use anyhow::{Context, Result, bail};
use console::style;
use runway::executor::CommandExecutor;
use runway::orchestrator::{DriveOptions, drive};
use runway::ui::icons::{CLOCK, PAUSED};
use runway::ui::report::status_icon;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::Session;

pub async fn cmd_drive(
    session: &Session,
    run: Option<&str>,
    command: Option<String>,
    timeout_secs: Option<u64>,
    max_phases: Option<usize>,
) -> Result<()> {
    let executor_config = &session.config.toml.executor;
    let Some(command) = command.or_else(|| executor_config.command.clone()) else {
        bail!(
            "No phase command configured. Set [executor] command in {} or pass --command.",
            session.config.config_file().display()
        );
    };
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .or_else(|| executor_config.timeout());

    let run_id = session.resolve_run(run)?;
    let _lock = session.lock(&run_id)?;
    let engine = session.engine()?;
    let working_dir = std::env::current_dir().context("Failed to get current directory")?;
    let executor = CommandExecutor::new(command, working_dir).with_timeout(timeout);

    let stop = Arc::new(AtomicBool::new(false));
    let signal_flag = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_flag.store(true, Ordering::SeqCst);
        }
    });

    if !session.json {
        println!(
            "{}Driving {}{}",
            CLOCK,
            style(run_id.to_string()).bold(),
            timeout
                .map(|t| format!(" (phase timeout {}s)", t.as_secs()))
                .unwrap_or_default()
        );
    }

    let outcome = drive(
        &engine,
        &executor,
        &run_id,
        &DriveOptions { max_phases },
        &stop,
    )
    .await?;

    if session.json {
        return session.print_json(&outcome.run);
    }
    let run = &outcome.run;
    println!(
        "{}{} after {} phase(s): {}{}",
        status_icon(run.status),
        run.run_id,
        outcome.phases_executed,
        run.status,
        run.current_phase
            .map(|p| format!(" at {}", p))
            .unwrap_or_default()
    );
    if outcome.stopped {
        println!(
            "{}Interrupted; continue with 'runway resume {}' then 'runway drive {}'",
            PAUSED, run.run_id, run.run_id
        );
    } else if let Some(gate) = run.pending_gate {
        println!(
            "{}completed and awaits approval: 'runway resume {}'",
            style(gate).yellow(),
            run.run_id
        );
    }
    Ok(())
}
