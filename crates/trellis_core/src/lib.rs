//! # Trellis Core
//!
//! The dataflow heart of the Trellis UI toolkit. Every observable value
//! (layout claims, colors, geometry, animation state, window dimensions) is a
//! node in a [`PropertyGraph`]; a node carries either a literal value or an
//! expression over other nodes.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        TRELLIS CORE                        │
//! ├────────────────────────────────────────────────────────────┤
//! │  Batch ──> Command ──> PropertyGraph ──> ChangeSet         │
//! │                            │                 │             │
//! │                   cycle check + Kahn     observers          │
//! ├────────────────────────────────────────────────────────────┤
//! │  Clock │ Mutex/Condvar (debug owner) │ BoundedChannel      │
//! │  ThreadKindRegistry (UI / EVENT / RENDER singletons)       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. **One owner** - the graph is mutated by a single thread (the EVENT
//!    thread, see `trellis_sched`); other threads read through a freeze.
//! 2. **Validate, then mutate** - a rejected operation leaves the graph
//!    exactly as it was.
//! 3. **Observers see whole batches** - never a half-applied batch.
//!
//! ## Example
//!
//! ```rust
//! use trellis_core::{Expression, PropertyGraph, PropertyId, PropertyValue, Timestamp};
//!
//! let mut graph = PropertyGraph::new();
//! let a = PropertyId::new(1, 0);
//! let b = PropertyId::new(2, 0);
//! let t = Timestamp::from_nanos(1);
//!
//! graph.add_value(a, PropertyValue::Int(2), t).unwrap();
//! let times_three = Expression::new(vec![a], |inputs| {
//!     PropertyValue::Int(inputs.int(0).unwrap_or_default() * 3)
//! });
//! graph.add_expression(b, times_three, t).unwrap();
//! assert_eq!(graph.get(b), Some(&PropertyValue::Int(6)));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod clock;
pub mod error;
pub mod property;
pub mod sync;
pub mod thread;

pub use clock::{Clock, ClockWaker, ManualClock, MonotonicClock, SharedClock, Timestamp};
pub use error::{CoreError, CoreResult};
pub use property::{
    Aabr, Batch, BatchBuilder, BatchOutcome, ChangeSet, Color, Command, CommandOp, Expression,
    GraphSnapshot, Inputs, Mat3, Mat4, NodeSource, ObserverId, PendingNotifications, Polygon,
    PropertyGraph, PropertyId, PropertyIdAllocator, PropertyNode, PropertyValue, ValueKind, Vec2,
    Vec4,
};
pub use sync::{BoundedChannel, Condvar, Mutex, MutexGuard, PopError, PushError};
pub use thread::{ThreadKind, ThreadKindRegistry, ThreadRegistration};
