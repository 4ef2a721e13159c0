//! Configuration view and validation commands: `runway config`.

use anyhow::{Context, Result};
use runway::config::RunwayToml;
use runway::ui::icons::{CHECK, WARN};

use super::super::ConfigCommands;
use super::Session;

pub fn cmd_config(session: &Session, command: Option<ConfigCommands>) -> Result<()> {
    let config = &session.config;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            if session.json {
                return session.print_json(&serde_json::json!({
                    "home": config.home,
                    "config_file": config_path,
                    "config_file_exists": config_path.exists(),
                    "organization": config.organization,
                    "project": config.project,
                    "autonomy": config.autonomy,
                    "settings": config.toml,
                }));
            }

            println!();
            println!("Runway Configuration");
            println!("====================");
            println!();
            println!("State root:  {}", config.home.display());
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("Config file: none (using defaults)");
            }
            println!();

            let rendered =
                toml::to_string_pretty(&config.toml).context("Failed to render configuration")?;
            for line in rendered.lines() {
                println!("  {}", line);
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  organization = \"{}\"", config.organization);
            println!("  project = \"{}\"", config.project);
            println!("  autonomy = \"{}\"", config.autonomy);
            println!(
                "  gates = [{}]",
                config
                    .autonomy_policy()
                    .gates(config.autonomy)
                    .iter()
                    .map(|p| format!("\"{}\"", p))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!();
            if !config_path.exists() {
                println!("Run 'runway config init' to create a runway.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            let mut warnings = config.validate();
            if let Err(e) = config.catalog() {
                warnings.push(e.to_string());
            }

            if session.json {
                return session.print_json(&serde_json::json!({
                    "valid": warnings.is_empty(),
                    "warnings": warnings,
                }));
            }

            println!();
            if !config_path.exists() {
                println!("No runway.toml found. Using defaults.");
            }
            if warnings.is_empty() {
                println!("{}Configuration is valid.", CHECK);
            } else {
                println!("{}Configuration warnings:", WARN);
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("runway.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            RunwayToml::default().save(&config_path)?;

            println!("{}Created runway.toml at {}", CHECK, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [defaults] organization, project, autonomy, max_retries");
            println!("  - [cleanup] max_age_days, mode");
            println!("  - [autonomy] gates per level, e.g. guarded = [\"architect\", \"release\"]");
            println!("  - [[workflows]] custom phase pipelines");
            println!("  - [executor] command and timeout_secs for 'runway drive'");
            println!("  - [provider] kind = \"local\" for work-item tracking");
            println!();
        }
    }

    Ok(())
}
