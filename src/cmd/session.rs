//! Shared command context: configuration, store handles, run resolution.

use anyhow::{Context, Result, bail};
use runway::config::RunwayConfig;
use runway::errors::RunwayError;
use runway::orchestrator::{RecoveryEngine, WorkflowEngine};
use runway::provider::build_provider;
use runway::registry::RunRegistry;
use runway::store::{RunLock, StoreLayout};
use runway::ui::format_run_row;
use runway_common::{Run, RunId};
use serde::Serialize;
use std::path::PathBuf;

use super::super::Cli;

pub struct Session {
    pub config: RunwayConfig,
    pub json: bool,
    pub assume_yes: bool,
}

impl Session {
    pub fn load(cli: &Cli, home: PathBuf) -> Result<Self> {
        let config = RunwayConfig::load(home)
            .context("Failed to load runway configuration")?
            .with_cli_args(cli.org.clone(), cli.project.clone(), None);
        Ok(Self {
            config,
            json: cli.json,
            assume_yes: cli.yes,
        })
    }

    pub fn layout(&self) -> StoreLayout {
        self.config.layout()
    }

    pub fn registry(&self) -> RunRegistry {
        RunRegistry::new(self.layout())
    }

    pub fn engine(&self) -> Result<WorkflowEngine> {
        let layout = self.layout();
        let provider = build_provider(self.config.toml.provider.kind, &layout);
        let catalog = self
            .config
            .catalog()
            .context("Invalid workflow configuration")?;
        Ok(
            WorkflowEngine::new(layout, catalog, self.config.autonomy_policy())
                .with_default_autonomy(self.config.autonomy)
                .with_provider(provider),
        )
    }

    pub fn recovery(&self) -> RecoveryEngine {
        RecoveryEngine::new(self.layout())
    }

    /// Take the single-writer lock for a run.
    pub fn lock(&self, run_id: &RunId) -> Result<RunLock> {
        if !self.registry().exists(run_id) {
            return Err(RunwayError::RunNotFound(run_id.to_string()).into());
        }
        Ok(RunLock::acquire(&self.layout(), run_id)?)
    }

    /// Whether prompts may be shown.
    pub fn interactive(&self) -> bool {
        !self.assume_yes && !self.json && console::Term::stdout().is_term()
    }

    /// The explicit run id, or the single active run of the current
    /// organization and project.
    pub fn resolve_run(&self, explicit: Option<&str>) -> Result<RunId> {
        if let Some(id) = explicit {
            return Ok(id.parse::<RunId>().map_err(RunwayError::from)?);
        }

        let org = &self.config.organization;
        let project = &self.config.project;
        let active = self.registry().active(Some(org), Some(project))?;
        match active.len() {
            0 => bail!(
                "No active runs in {}/{}. Pass a run id or start one with 'runway start'.",
                org,
                project
            ),
            1 => Ok(active[0].run_id.clone()),
            _ if self.interactive() => pick_run(&active),
            n => bail!(
                "{} active runs in {}/{}; pass one of:\n  {}",
                n,
                org,
                project,
                active
                    .iter()
                    .map(|r| r.run_id.to_string())
                    .collect::<Vec<_>>()
                    .join("\n  ")
            ),
        }
    }

    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
        println!("{}", rendered);
        Ok(())
    }
}

fn pick_run(active: &[Run]) -> Result<RunId> {
    use dialoguer::{Select, theme::ColorfulTheme};

    let items: Vec<String> = active.iter().map(format_run_row).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Several runs are active; which one?")
        .items(&items)
        .default(0)
        .interact()?;
    Ok(active[selection].run_id.clone())
}
