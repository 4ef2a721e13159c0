//! Run lifecycle engine for phased development workflows.
//!
//! A run moves through an ordered set of phases (frame, architect, build,
//! evaluate, release). The [`orchestrator::WorkflowEngine`] owns the state
//! machine; every transition is journaled as a checkpoint, an append-only
//! event and a registry record under a single state root.

pub mod checkpoint;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod events;
pub mod executor;
pub mod orchestrator;
pub mod provider;
pub mod registry;
pub mod store;
pub mod ui;
pub mod workflow;

pub use checkpoint::CheckpointStore;
pub use cleanup::{CleanupMode, CleanupOptions, CleanupReport, CleanupService};
pub use config::{RunwayConfig, RunwayToml};
pub use errors::{Result, RunwayError};
pub use events::{EventFilter, EventLog, EventStream};
pub use orchestrator::{RecoveryEngine, RecoveryTarget, StartRequest, WorkflowEngine};
pub use registry::{RunFilter, RunRegistry, RunView};
pub use store::{RunLock, StoreLayout};
pub use workflow::{AutonomyPolicy, WorkflowCatalog, WorkflowDefinition};
