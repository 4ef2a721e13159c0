//! Checkpoint commands: `runway checkpoint capture|show|list`.

use anyhow::{Context, Result};
use runway::checkpoint::CheckpointStore;
use runway::errors::RunwayError;
use runway::events::EventLog;
use runway::orchestrator::CHECKPOINT_META_KEY;
use runway::ui::print_checkpoint;
use runway_common::{EventDraft, EventType, PhaseName, RunId};

use super::super::CheckpointCommands;
use super::Session;

pub fn cmd_checkpoint(session: &Session, command: CheckpointCommands) -> Result<()> {
    let store = CheckpointStore::new(session.layout());

    match command {
        CheckpointCommands::Capture {
            run,
            phase,
            step,
            state,
        } => {
            let run_id = session.resolve_run(run.as_deref())?;
            let record = session.registry().load(&run_id)?;
            let phase = match phase {
                Some(p) => Some(
                    p.parse::<PhaseName>()
                        .with_context(|| format!("Invalid --phase '{}'", p))?,
                ),
                None => record.current_phase,
            };
            let step = step.or_else(|| record.current_step.clone());
            let state = match state {
                Some(json) => serde_json::from_str(&json).context("Invalid --state JSON")?,
                None => serde_json::to_value(&record).context("Failed to snapshot run")?,
            };

            let checkpoint = store.capture(&run_id, phase, step.clone(), state)?;
            let mut draft = EventDraft::new(EventType::CheckpointCreated)
                .maybe_phase(phase)
                .meta(CHECKPOINT_META_KEY, checkpoint.checkpoint_id.clone());
            if let Some(step) = step {
                draft = draft.step(step);
            }
            EventLog::new(session.layout()).append(&run_id, draft)?;

            if session.json {
                return session.print_json(&checkpoint);
            }
            print_checkpoint(&checkpoint);
        }
        CheckpointCommands::Show { checkpoint_id, run } => {
            let checkpoint = match run {
                Some(run) => {
                    let run_id: RunId = run.parse().map_err(RunwayError::from)?;
                    store.read_for_run(&run_id, &checkpoint_id)?
                }
                None => store.read(&checkpoint_id)?,
            };
            if session.json {
                return session.print_json(&checkpoint);
            }
            print_checkpoint(&checkpoint);
            let state = serde_json::to_string_pretty(&checkpoint.state)
                .context("Failed to render checkpoint state")?;
            println!("{}", state);
        }
        CheckpointCommands::List { run } => {
            let run_id = session.resolve_run(run.as_deref())?;
            let checkpoints = store.list(&run_id)?;
            if session.json {
                return session.print_json(&checkpoints);
            }
            if checkpoints.is_empty() {
                println!("No checkpoints for {}.", run_id);
            }
            for checkpoint in &checkpoints {
                print_checkpoint(checkpoint);
            }
        }
    }

    Ok(())
}
