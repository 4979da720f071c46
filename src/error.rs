use thiserror::Error;

/// Reserved exit code for a job whose process outlived its deadline.
pub const CODE_TIMEOUT: i32 = 124;

/// Reserved exit code when the agent binary cannot be spawned.
pub const CODE_SPAWN_FAILURE: i32 = 127;

/// Reserved exit code for a job stopped by user request. Distinct from
/// [`CODE_TIMEOUT`] so a later resume can tell the two apart.
pub const CODE_INTERRUPTED: i32 = 130;

/// Domain failures that callers branch on; everything else travels as
/// `anyhow::Error` with context.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Replay precondition failed: {0}")]
    ReplayPrecondition(String),

    #[error("No commit found for checkpoint '{0}'")]
    CheckpointNotFound(String),
}
