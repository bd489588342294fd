//! # Render Error Types

use thiserror::Error;
use trellis_core::CoreError;

use crate::window::WindowId;

/// Errors from windows, contexts and the render manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The window's context could not be made current on this thread.
    #[error("graphics context of window {0} is not current")]
    ContextNotCurrent(WindowId),

    /// The window failed to draw itself.
    #[error("window {window} failed to draw: {reason}")]
    DrawFailed {
        /// The window.
        window: WindowId,
        /// What went wrong.
        reason: String,
    },

    /// The render manager has been stopped.
    #[error("render manager stopped")]
    Stopped,

    /// The OS refused to spawn the render thread, or it died during start-up.
    #[error("failed to spawn render thread: {0}")]
    Spawn(String),

    /// A core error (duplicate RENDER thread, ...).
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;
