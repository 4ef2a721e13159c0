//! Read-only views: `runway status`, `runway list`, `runway workflows`.

use anyhow::{Context, Result};
use console::style;
use runway::config::RunwayConfig;
use runway::registry::RunFilter;
use runway::ui::{print_run, print_run_table};
use runway_common::RunStatus;

use super::Session;

pub struct ListArgs {
    pub status: Option<String>,
    pub work_item: Option<String>,
    pub workflow: Option<String>,
    pub all: bool,
    /// `--org` was given without `--project`.
    pub whole_organization: bool,
    pub limit: Option<usize>,
}

/// Organization and project a listing is restricted to.
fn list_scope(config: &RunwayConfig, args: &ListArgs) -> (Option<String>, Option<String>) {
    if args.all {
        (None, None)
    } else if args.whole_organization {
        (Some(config.organization.clone()), None)
    } else {
        (Some(config.organization.clone()), Some(config.project.clone()))
    }
}

pub fn cmd_status(session: &Session, run: Option<&str>, include_events: bool) -> Result<()> {
    let run_id = session.resolve_run(run)?;
    let view = session.registry().get(&run_id, include_events)?;
    if session.json {
        return session.print_json(&view);
    }
    print_run(&view);
    Ok(())
}

pub fn cmd_list(session: &Session, args: ListArgs) -> Result<()> {
    let status = args
        .status
        .as_deref()
        .map(|s| s.parse::<RunStatus>())
        .transpose()
        .context("Invalid --status value")?;

    let (organization, project) = list_scope(&session.config, &args);
    let filter = RunFilter {
        work_item_id: args.work_item,
        status,
        organization,
        project,
        workflow_id: args.workflow,
    };
    let limit = args.limit.unwrap_or(session.config.toml.defaults.list_limit);

    let runs = session.registry().list(&filter, limit)?;
    if session.json {
        return session.print_json(&runs);
    }
    print_run_table(&runs);
    Ok(())
}

pub fn cmd_workflows(session: &Session) -> Result<()> {
    let engine = session.engine()?;
    let catalog = engine.catalog();
    if session.json {
        let workflows: Vec<_> = catalog.iter().collect();
        return session.print_json(&workflows);
    }

    let gates = engine.policy().gates(session.config.autonomy);
    println!();
    for workflow in catalog.iter() {
        println!(
            "{}  {}",
            style(&workflow.id).bold(),
            style(&workflow.description).dim()
        );
        let phases: Vec<String> = workflow
            .phases
            .iter()
            .map(|phase| {
                if gates.contains(phase) {
                    format!("{}*", phase)
                } else {
                    phase.to_string()
                }
            })
            .collect();
        println!("  phases:      {}", phases.join(" → "));
        println!("  max_retries: {}", workflow.max_retries);
        println!();
    }
    println!(
        "{}",
        style(format!(
            "* pauses for approval at autonomy level '{}'",
            session.config.autonomy
        ))
        .dim()
    );
    Ok(())
}
