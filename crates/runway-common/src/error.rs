use thiserror::Error;

/// Failure to parse one of the domain enums or identifiers from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid run id '{value}': {reason}")]
    RunId { value: String, reason: String },

    #[error("Unknown phase '{0}'. Valid values: frame, architect, build, evaluate, release")]
    Phase(String),

    #[error(
        "Unknown run status '{0}'. Valid values: pending, in_progress, paused, completed, failed, cancelled"
    )]
    RunStatus(String),

    #[error("Unknown autonomy level '{0}'. Valid values: dry-run, assist, guarded, autonomous")]
    Autonomy(String),
}
