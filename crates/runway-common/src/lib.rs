//! Shared domain types for the runway run lifecycle engine.
//!
//! Everything here is plain data plus the small amount of behavior that belongs to
//! the data itself (parsing, display, phase ordering). Persistence and the state
//! machine live in the `runway` crate.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod executor;
pub mod id;
pub mod phase;
pub mod run;

pub use checkpoint::Checkpoint;
pub use error::ParseError;
pub use event::{Artifact, Event, EventDraft, EventError, EventType};
pub use executor::{PhaseContext, PhaseExecution, PhaseExecutor, PhaseReport};
pub use id::RunId;
pub use phase::{PhaseName, PhaseRecord, PhaseStatus};
pub use run::{AutonomyLevel, Run, RunStatus};
