//! # Toolkit Configuration
//!
//! One TOML document with a table per subsystem. Every table and field is
//! optional:
//!
//! ```toml
//! [scheduler]
//! change_feed_capacity = 128
//!
//! [render]
//! thread_name = "my-render"
//!
//! [timers]
//! worker_threads = 1
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use trellis_render::RenderConfig;
use trellis_sched::{SchedulerConfig, TimerPoolConfig};

use crate::error::{ToolkitError, ToolkitResult};

/// Configuration for a whole [`Toolkit`](crate::Toolkit).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrellisConfig {
    /// EVENT thread settings.
    pub scheduler: SchedulerConfig,
    /// RENDER thread settings.
    pub render: RenderConfig,
    /// Timer pool settings.
    pub timers: TimerPoolConfig,
}

impl TrellisConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// `Config` if the document is malformed or has unknown tables.
    pub fn from_toml_str(source: &str) -> ToolkitResult<Self> {
        toml::from_str(source).map_err(|err| ToolkitError::Config(err.to_string()))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// `Config` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> ToolkitResult<Self> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|err| ToolkitError::Config(format!("{}: {err}", path.display())))?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Defaults with a single timer worker; what tests and tools want.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            timers: TimerPoolConfig::minimal(),
            ..Self::default()
        }
    }
}
