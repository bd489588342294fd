//! Render manager configuration.

use serde::Deserialize;

/// Configuration for the [`RenderManager`](crate::RenderManager).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Name given to the RENDER thread.
    pub thread_name: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            thread_name: "trellis-render".to_string(),
        }
    }
}
