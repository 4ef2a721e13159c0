//! Workflow definitions and autonomy gating.
//!
//! A workflow is an ordered subset of the fixed pipeline plus a retry cap. Two
//! workflows are built in; `[[workflows]]` entries in `runway.toml` add to or
//! replace them.

use runway_common::{AutonomyLevel, PhaseName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::errors::{Result, RunwayError};

pub const DEFAULT_WORKFLOW: &str = "sdlc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub phases: Vec<PhaseName>,
    /// Build re-entries allowed after an evaluate NO-GO.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    2
}

impl WorkflowDefinition {
    pub fn new(id: &str, description: &str, phases: &[PhaseName], max_retries: u32) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            phases: phases.to_vec(),
            max_retries,
        }
    }

    /// Check the definition is usable by the engine.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(RunwayError::Configuration(
                "workflow id must not be empty".to_string(),
            ));
        }
        if self.phases.is_empty() {
            return Err(RunwayError::Configuration(format!(
                "workflow '{}' has no phases",
                self.id
            )));
        }
        if !self.phases.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(RunwayError::Configuration(format!(
                "workflow '{}' phases must follow frame, architect, build, evaluate, release without repeats",
                self.id
            )));
        }
        if self.phases.contains(&PhaseName::Evaluate) && !self.phases.contains(&PhaseName::Build) {
            return Err(RunwayError::Configuration(format!(
                "workflow '{}' has evaluate without build to retry",
                self.id
            )));
        }
        Ok(())
    }
}

pub fn builtin_workflows() -> Vec<WorkflowDefinition> {
    vec![
        WorkflowDefinition::new(
            "sdlc",
            "Full pipeline: frame, architect, build, evaluate, release",
            &PhaseName::ALL,
            2,
        ),
        WorkflowDefinition::new(
            "hotfix",
            "Skip architecture for small, urgent fixes",
            &[
                PhaseName::Frame,
                PhaseName::Build,
                PhaseName::Evaluate,
                PhaseName::Release,
            ],
            1,
        ),
    ]
}

/// Every workflow a run can be started with, keyed by id.
#[derive(Debug, Clone)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, WorkflowDefinition>,
}

impl Default for WorkflowCatalog {
    fn default() -> Self {
        Self {
            workflows: builtin_workflows()
                .into_iter()
                .map(|w| (w.id.clone(), w))
                .collect(),
        }
    }
}

impl WorkflowCatalog {
    /// Built-ins overlaid with `configured`. A configured id that matches a
    /// built-in replaces it.
    pub fn with_configured(configured: &[WorkflowDefinition]) -> Result<Self> {
        let mut catalog = Self::default();
        for workflow in configured {
            workflow.validate()?;
            catalog
                .workflows
                .insert(workflow.id.clone(), workflow.clone());
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&WorkflowDefinition> {
        self.workflows.get(id).ok_or_else(|| {
            RunwayError::Configuration(format!(
                "unknown workflow '{}' (available: {})",
                id,
                self.ids().join(", ")
            ))
        })
    }

    pub fn ids(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values()
    }
}

/// Which phases pause for approval at each autonomy level.
#[derive(Debug, Clone)]
pub struct AutonomyPolicy {
    gates: HashMap<AutonomyLevel, Vec<PhaseName>>,
}

impl Default for AutonomyPolicy {
    fn default() -> Self {
        Self {
            gates: AutonomyLevel::ALL
                .iter()
                .map(|level| (*level, level.default_gates()))
                .collect(),
        }
    }
}

impl AutonomyPolicy {
    /// Replace the gate list of `level`.
    pub fn with_gates(mut self, level: AutonomyLevel, gates: Vec<PhaseName>) -> Self {
        self.gates.insert(level, gates);
        self
    }

    pub fn gates(&self, level: AutonomyLevel) -> &[PhaseName] {
        self.gates.get(&level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_gate(&self, level: AutonomyLevel, phase: PhaseName) -> bool {
        self.gates(level).contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        for workflow in builtin_workflows() {
            workflow.validate().unwrap();
        }
        let catalog = WorkflowCatalog::default();
        assert_eq!(catalog.ids(), vec!["hotfix", "sdlc"]);
        assert_eq!(catalog.get("sdlc").unwrap().phases.len(), 5);
        assert_eq!(catalog.get("hotfix").unwrap().max_retries, 1);
    }

    #[test]
    fn test_unknown_workflow_is_configuration_error() {
        let catalog = WorkflowCatalog::default();
        let err = catalog.get("nope").unwrap_err();
        assert_eq!(err.code(), "configuration_error");
        assert!(err.to_string().contains("sdlc"));
    }

    #[test]
    fn test_configured_workflow_overrides_builtin() {
        let custom = WorkflowDefinition::new("sdlc", "", &[PhaseName::Frame], 0);
        let docs = WorkflowDefinition::new("docs", "", &[PhaseName::Frame, PhaseName::Release], 0);
        let catalog = WorkflowCatalog::with_configured(&[custom, docs]).unwrap();
        assert_eq!(catalog.get("sdlc").unwrap().phases, vec![PhaseName::Frame]);
        assert!(catalog.get("docs").is_ok());
    }

    #[test]
    fn test_invalid_definitions_are_rejected() {
        let empty = WorkflowDefinition::new("empty", "", &[], 1);
        assert!(empty.validate().is_err());

        let unordered =
            WorkflowDefinition::new("backwards", "", &[PhaseName::Build, PhaseName::Frame], 1);
        assert!(unordered.validate().is_err());

        let repeated =
            WorkflowDefinition::new("twice", "", &[PhaseName::Build, PhaseName::Build], 1);
        assert!(repeated.validate().is_err());

        let no_build = WorkflowDefinition::new("review", "", &[PhaseName::Evaluate], 1);
        assert!(WorkflowCatalog::with_configured(&[no_build]).is_err());
    }

    #[test]
    fn test_default_gates_per_level() {
        let policy = AutonomyPolicy::default();
        assert!(policy.is_gate(AutonomyLevel::Guarded, PhaseName::Release));
        assert!(policy.is_gate(AutonomyLevel::Guarded, PhaseName::Architect));
        assert!(!policy.is_gate(AutonomyLevel::Guarded, PhaseName::Build));
        assert!(policy.is_gate(AutonomyLevel::Assist, PhaseName::Frame));
        assert!(policy.is_gate(AutonomyLevel::DryRun, PhaseName::Evaluate));
        assert!(AutonomyPolicy::default().gates(AutonomyLevel::Autonomous).is_empty());
    }

    #[test]
    fn test_gate_override_replaces_level() {
        let policy =
            AutonomyPolicy::default().with_gates(AutonomyLevel::Guarded, vec![PhaseName::Build]);
        assert!(policy.is_gate(AutonomyLevel::Guarded, PhaseName::Build));
        assert!(!policy.is_gate(AutonomyLevel::Guarded, PhaseName::Release));
    }
}
