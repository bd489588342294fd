//! # Trellis Sched
//!
//! Threads that drive the property graph over time.
//!
//! ## Architecture
//!
//! ```text
//!   UI thread ──┐                                   ┌──> observers
//!   workers   ──┼──> [queue] ──> EVENT thread ──────┼──> change feeds
//!   timers    ──┘    (batches,   sort by timestamp, └──> take_changes()
//!                     events)    apply to graph
//!
//!   submit(timer) ──> [bounded channel] ──> dispatcher ──> tokio fibers
//!                                            (TIMER)       (TIMER workers)
//! ```
//!
//! ## Rules
//!
//! 1. **The EVENT thread owns the graph** - everything else schedules batches
//!    or reads through a freeze.
//! 2. **Producers never see batch errors** - they are logged on the EVENT
//!    thread and the batch continues.
//! 3. **Shutdown is idempotent** - `stop()` and `shutdown()` may be called any
//!    number of times, and `Drop` calls them.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod freeze;
pub mod scheduler;
pub mod timer;

pub use config::{SchedulerConfig, TimerPoolConfig};
pub use error::{SchedError, SchedResult};
pub use freeze::FreezeGuard;
pub use scheduler::{Scheduler, SchedulerStats};
pub use timer::{Repeat, Timer, TimerHandle, TimerId, TimerPool, TimerStats};
