//! # Scheduling Configuration
//!
//! Plain structs with sensible defaults; every field may be omitted when
//! loading from TOML.

use serde::Deserialize;

/// Configuration for the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name given to the EVENT thread.
    pub thread_name: String,
    /// Default capacity of a change feed; a full feed drops change-sets.
    pub change_feed_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: "trellis-event".to_string(),
            change_feed_capacity: 64,
        }
    }
}

/// Configuration for the [`TimerPool`](crate::TimerPool).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimerPoolConfig {
    /// Timers waiting for the dispatcher; `submit` blocks when full.
    pub channel_capacity: usize,
    /// Runtime worker threads running timer fibers.
    pub worker_threads: usize,
}

impl Default for TimerPoolConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            worker_threads: 2,
        }
    }
}

impl TimerPoolConfig {
    /// One worker and a short channel, for tests and tools.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            channel_capacity: 16,
            worker_threads: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SchedulerConfig = toml::from_str("change_feed_capacity = 8").unwrap();
        assert_eq!(config.change_feed_capacity, 8);
        assert_eq!(config.thread_name, "trellis-event");

        let timers: TimerPoolConfig = toml::from_str("").unwrap();
        assert_eq!(timers, TimerPoolConfig::default());
    }
}
