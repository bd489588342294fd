//! # Scheduling Error Types

use thiserror::Error;
use trellis_core::CoreError;

/// Errors from the scheduler and timer pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// A core error (duplicate EVENT thread, closed timer channel, ...).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The scheduler has been stopped; nothing more can be scheduled.
    #[error("scheduler stopped")]
    Stopped,

    /// The OS refused to spawn a thread, or it died during start-up.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),

    /// The timer runtime could not be built.
    #[error("failed to build timer runtime: {0}")]
    Runtime(String),
}

/// Result type for scheduling operations.
pub type SchedResult<T> = Result<T, SchedError>;
