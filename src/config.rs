//! Configuration for runway.
//!
//! Settings are read from `<home>/runway.toml`, then environment variables, then
//! CLI flags, each layer overriding the previous one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [defaults]
//! organization = "acme"
//! project = "billing"
//! autonomy = "guarded"
//! list_limit = 20
//!
//! [cleanup]
//! max_age_days = 30
//! mode = "archive"
//!
//! [autonomy]
//! guarded = ["architect", "release"]
//!
//! [[workflows]]
//! id = "docs"
//! description = "Documentation only"
//! phases = ["frame", "build", "release"]
//! max_retries = 0
//!
//! [executor]
//! command = "./scripts/run-phase.sh"
//! timeout_secs = 1800
//!
//! [provider]
//! kind = "local"
//! ```

use anyhow::{Context, Result};
use runway_common::{AutonomyLevel, PhaseName, RunId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::cleanup::{CleanupMode, CleanupOptions};
use crate::provider::ProviderKind;
use crate::registry::DEFAULT_LIST_LIMIT;
use crate::store::StoreLayout;
use crate::workflow::{AutonomyPolicy, WorkflowCatalog, WorkflowDefinition};

pub const CONFIG_FILE: &str = "runway.toml";
pub const HOME_DIR_NAME: &str = ".runway";
pub const LOGS_DIR: &str = "logs";

pub const ENV_HOME: &str = "RUNWAY_HOME";
pub const ENV_ORG: &str = "RUNWAY_ORG";
pub const ENV_PROJECT: &str = "RUNWAY_PROJECT";
pub const ENV_AUTONOMY: &str = "RUNWAY_AUTONOMY";

/// Defaults applied to new runs and listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub autonomy: AutonomyLevel,
    /// Replaces the retry cap of the built-in workflows when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_organization() -> String {
    "local".to_string()
}

fn default_project() -> String {
    "default".to_string()
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            organization: default_organization(),
            project: default_project(),
            autonomy: AutonomyLevel::default(),
            max_retries: None,
            list_limit: default_list_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
    #[serde(default)]
    pub mode: CleanupMode,
}

fn default_max_age_days() -> u32 {
    30
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            mode: CleanupMode::default(),
        }
    }
}

/// Gate overrides. A level that is not listed keeps its default gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default, rename = "dry-run", skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<Vec<PhaseName>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assist: Option<Vec<PhaseName>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guarded: Option<Vec<PhaseName>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous: Option<Vec<PhaseName>>,
}

impl AutonomyConfig {
    fn overrides(&self) -> Vec<(AutonomyLevel, &Vec<PhaseName>)> {
        [
            (AutonomyLevel::DryRun, &self.dry_run),
            (AutonomyLevel::Assist, &self.assist),
            (AutonomyLevel::Guarded, &self.guarded),
            (AutonomyLevel::Autonomous, &self.autonomous),
        ]
        .into_iter()
        .filter_map(|(level, gates)| gates.as_ref().map(|g| (level, g)))
        .collect()
    }
}

/// Shell command used by `runway drive` to execute phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
}

/// The complete runway.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunwayToml {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<WorkflowDefinition>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl RunwayToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse runway.toml")
    }

    /// Load `<home>/runway.toml`, or defaults when the file does not exist.
    pub fn load_or_default(home: &Path) -> Result<Self> {
        let config_path = home.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize runway.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Built-in and configured workflows. `defaults.max_retries` applies to the
    /// built-ins; configured workflows carry their own cap.
    pub fn catalog(&self) -> crate::errors::Result<WorkflowCatalog> {
        let mut definitions = Vec::new();
        if let Some(max_retries) = self.defaults.max_retries {
            for mut builtin in crate::workflow::builtin_workflows() {
                builtin.max_retries = max_retries;
                definitions.push(builtin);
            }
        }
        definitions.extend(self.workflows.iter().cloned());
        WorkflowCatalog::with_configured(&definitions)
    }

    pub fn autonomy_policy(&self) -> AutonomyPolicy {
        self.autonomy
            .overrides()
            .into_iter()
            .fold(AutonomyPolicy::default(), |policy, (level, gates)| {
                policy.with_gates(level, gates.clone())
            })
    }

    pub fn cleanup_options(&self) -> CleanupOptions {
        CleanupOptions {
            max_age_days: self.cleanup.max_age_days,
            mode: self.cleanup.mode,
            dry_run: false,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if RunId::new(
            &self.defaults.organization,
            &self.defaults.project,
            Uuid::nil(),
        )
        .is_err()
        {
            warnings.push(format!(
                "Invalid default organization/project '{}/{}': use letters, digits, '.', '_' or '-'",
                self.defaults.organization, self.defaults.project
            ));
        }

        if self.defaults.list_limit == 0 {
            warnings.push("defaults.list_limit is 0: `runway list` will show nothing".to_string());
        }

        if self.cleanup.max_age_days == 0 {
            warnings.push(
                "cleanup.max_age_days is 0: every finished run is eligible for cleanup".to_string(),
            );
        }

        for (level, gates) in self.autonomy.overrides() {
            let mut sorted = gates.clone();
            sorted.sort();
            sorted.dedup();
            if sorted.len() != gates.len() {
                warnings.push(format!("autonomy.{} lists a phase more than once", level));
            }
        }

        for (i, workflow) in self.workflows.iter().enumerate() {
            if let Err(e) = workflow.validate() {
                warnings.push(e.to_string());
            }
            if self.workflows[..i].iter().any(|w| w.id == workflow.id) {
                warnings.push(format!(
                    "workflow '{}' is defined more than once; the last definition wins",
                    workflow.id
                ));
            }
        }

        if self.executor.timeout_secs == Some(0) {
            warnings.push("executor.timeout_secs is 0: every phase will time out".to_string());
        }

        warnings
    }
}

/// Resolved runtime configuration.
///
/// It merges settings from:
/// 1. runway.toml in the state root
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct RunwayConfig {
    /// State root holding runs, archive, logs and runway.toml
    pub home: PathBuf,
    pub toml: RunwayToml,
    pub organization: String,
    pub project: String,
    pub autonomy: AutonomyLevel,
}

impl RunwayConfig {
    /// Locate the state root: explicit path, then `RUNWAY_HOME`, then a
    /// `.runway` directory in the current directory, then `~/.runway`.
    pub fn resolve_home(explicit: Option<PathBuf>) -> PathBuf {
        if let Some(home) = explicit {
            return home;
        }
        if let Some(home) = std::env::var_os(ENV_HOME).filter(|v| !v.is_empty()) {
            return PathBuf::from(home);
        }
        let local = PathBuf::from(HOME_DIR_NAME);
        if local.is_dir() {
            return local;
        }
        dirs::home_dir()
            .map(|home| home.join(HOME_DIR_NAME))
            .unwrap_or(local)
    }

    /// Load configuration for `home` and apply environment overrides.
    pub fn load(home: PathBuf) -> Result<Self> {
        let toml = RunwayToml::load_or_default(&home)?;

        let organization = env_nonempty(ENV_ORG).unwrap_or_else(|| toml.defaults.organization.clone());
        let project = env_nonempty(ENV_PROJECT).unwrap_or_else(|| toml.defaults.project.clone());
        let autonomy = match env_nonempty(ENV_AUTONOMY) {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid {} value", ENV_AUTONOMY))?,
            None => toml.defaults.autonomy,
        };

        Ok(Self {
            home,
            toml,
            organization,
            project,
            autonomy,
        })
    }

    /// Apply CLI overrides on top of file and environment settings.
    pub fn with_cli_args(
        mut self,
        organization: Option<String>,
        project: Option<String>,
        autonomy: Option<AutonomyLevel>,
    ) -> Self {
        if let Some(org) = organization {
            self.organization = org;
        }
        if let Some(project) = project {
            self.project = project;
        }
        if let Some(autonomy) = autonomy {
            self.autonomy = autonomy;
        }
        self
    }

    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.home)
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join(LOGS_DIR)
    }

    pub fn catalog(&self) -> crate::errors::Result<WorkflowCatalog> {
        self.toml.catalog()
    }

    pub fn autonomy_policy(&self) -> AutonomyPolicy {
        self.toml.autonomy_policy()
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if RunId::new(&self.organization, &self.project, Uuid::nil()).is_err() {
            warnings.push(format!(
                "Effective organization/project '{}/{}' is not a valid slug pair",
                self.organization, self.project
            ));
        }
        warnings
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
