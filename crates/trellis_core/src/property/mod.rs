//! # Property Graph
//!
//! Nodes are addressed by [`PropertyId`] handles into a central registry;
//! there are no pointers between nodes. Each node keeps its `dependencies`
//! (what it reads) and the inverse `subscribers` (who reads it).
//!
//! ```text
//!   a = 2 ──> b = a * 3 ──> c = b + 1
//!   │          │             │
//!   subscribers: {b}  {c}    {}
//! ```
//!
//! All writes are expressed as [`Command`]s grouped in [`Batch`]es; the graph
//! applies them and reports a [`ChangeSet`] of ids whose value actually
//! changed.

mod change;
mod command;
mod expression;
mod graph;
mod id;
mod node;
mod observer;
mod snapshot;
mod value;

pub use change::ChangeSet;
pub use command::{Batch, BatchBuilder, BatchOutcome, Command, CommandOp};
pub use expression::{Expression, Inputs};
pub use graph::PropertyGraph;
pub use id::{PropertyId, PropertyIdAllocator};
pub use node::{NodeSource, PropertyNode};
pub use observer::{ObserverId, ObserverRegistry, PendingNotifications};
pub use snapshot::GraphSnapshot;
pub use value::{Aabr, Color, Mat3, Mat4, Polygon, PropertyValue, ValueKind, Vec2, Vec4};
