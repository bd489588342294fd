//! # Synchronization Primitives
//!
//! Every Trellis thread meets the others through these types:
//!
//! ```text
//! UI thread ──> Scheduler queue ──> EVENT thread
//!      │         (Mutex + Condvar)        │
//!      │                                  ▼
//!      └──────> Dirty window set ──> RENDER thread
//!                (Mutex + Condvar)
//!
//! TimerPool::submit ──> BoundedChannel ──> TIMER dispatcher
//! ```
//!
//! The mutex records its owner in debug builds so code paths can assert
//! they hold (or do not hold) a lock.

mod channel;
mod mutex;

pub use channel::{BoundedChannel, PopError, PushError};
pub use mutex::{Condvar, Mutex, MutexGuard};
