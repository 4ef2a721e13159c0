//! Retention sweep: `runway cleanup`.

use anyhow::{Context, Result};
use runway::cleanup::{CleanupMode, CleanupService};
use runway::ui::print_cleanup;

use super::Session;

pub fn cmd_cleanup(
    session: &Session,
    max_age_days: Option<u32>,
    mode: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    use dialoguer::Confirm;

    let mut options = session.config.toml.cleanup_options();
    if let Some(days) = max_age_days {
        options.max_age_days = days;
    }
    if let Some(mode) = mode {
        options.mode = mode
            .parse::<CleanupMode>()
            .context("Invalid --mode value")?;
    }
    options.dry_run = dry_run;

    let service = CleanupService::new(session.layout());
    if !dry_run && session.interactive() {
        let eligible = service.eligible(options.max_age_days)?;
        if eligible.is_empty() {
            println!("Nothing to clean up.");
            return Ok(());
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "{} {} finished run(s) older than {} days?",
                if options.mode == CleanupMode::Archive {
                    "Archive"
                } else {
                    "Delete"
                },
                eligible.len(),
                options.max_age_days
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = service.cleanup(&options);
    if session.json {
        return session.print_json(&report);
    }
    print_cleanup(&report, dry_run);
    Ok(())
}
