//! Work items: `runway item`.

use anyhow::{Result, bail};
use runway::provider::{Capability, WorkItemProvider, WorkItemUpdate, build_provider};
use runway::ui::icons::CHECK;
use runway::ui::print_work_item;
use std::sync::Arc;

use super::super::ItemCommands;
use super::Session;

fn provider(session: &Session) -> Result<Arc<dyn WorkItemProvider>> {
    match build_provider(session.config.toml.provider.kind, &session.layout()) {
        Some(provider) => Ok(provider),
        None => bail!(
            "No work-item provider configured. Set [provider] kind = \"local\" in {}",
            session.config.config_file().display()
        ),
    }
}

fn require(provider: &dyn WorkItemProvider, capability: Capability) -> Result<()> {
    if !provider.capabilities().contains(&capability) {
        bail!(
            "The {} provider does not support {:?}",
            provider.kind(),
            capability
        );
    }
    Ok(())
}

pub fn cmd_item(session: &Session, command: ItemCommands) -> Result<()> {
    let provider = provider(session)?;
    let provider = provider.as_ref();

    let (item, verb) = match command {
        ItemCommands::Create { title, body } => {
            require(provider, Capability::Create)?;
            (provider.create(&title, &body)?, Some("Created"))
        }
        ItemCommands::Show { id } => {
            require(provider, Capability::Fetch)?;
            (provider.fetch(&id)?, None)
        }
        ItemCommands::Edit { id, title, body } => {
            require(provider, Capability::Update)?;
            (
                provider.update(&id, WorkItemUpdate { title, body })?,
                Some("Updated"),
            )
        }
        ItemCommands::Comment { id, body } => {
            require(provider, Capability::Comment)?;
            (provider.comment(&id, &body)?, Some("Commented on"))
        }
        ItemCommands::Label { id, label } => {
            require(provider, Capability::Label)?;
            (provider.label(&id, &label)?, Some("Labeled"))
        }
        ItemCommands::Milestone { id, milestone } => {
            require(provider, Capability::Milestone)?;
            (provider.milestone(&id, &milestone)?, Some("Updated milestone of"))
        }
        ItemCommands::Close { id } => {
            require(provider, Capability::Close)?;
            (provider.close(&id)?, Some("Closed"))
        }
    };

    if session.json {
        return session.print_json(&item);
    }
    if let Some(verb) = verb {
        println!("{}{} {}", CHECK, verb, item.id);
    }
    print_work_item(&item);
    Ok(())
}
