//! # Toolkit Error Types

use thiserror::Error;
use trellis_core::CoreError;
use trellis_render::RenderError;
use trellis_sched::SchedError;

/// Errors surfaced by the toolkit facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolkitError {
    /// Property graph or thread registry error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Scheduler or timer pool error.
    #[error(transparent)]
    Sched(#[from] SchedError),

    /// Render manager error.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The toolkit has been shut down.
    #[error("toolkit shut down")]
    ShutDown,
}

impl ToolkitError {
    /// Returns the underlying core error, however deeply it is wrapped.
    #[must_use]
    pub const fn core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(err)
            | Self::Sched(SchedError::Core(err))
            | Self::Render(RenderError::Core(err)) => Some(err),
            _ => None,
        }
    }

    /// Returns true if a singleton thread kind was already taken.
    #[must_use]
    pub const fn is_duplicate_singleton(&self) -> bool {
        matches!(self.core(), Some(CoreError::DuplicateSingleton { .. }))
    }
}

/// Result type for toolkit operations.
pub type ToolkitResult<T> = Result<T, ToolkitError>;
