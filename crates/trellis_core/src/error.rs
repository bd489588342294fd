//! # Core Error Types
//!
//! All errors that can occur in the property graph and its plumbing.

use std::thread::ThreadId;

use thiserror::Error;

use crate::clock::Timestamp;
use crate::property::{PropertyId, ValueKind};
use crate::thread::ThreadKind;

/// Errors that can occur in the core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A property with this id (or serial) already exists.
    #[error("duplicate property id: {0}")]
    DuplicateId(PropertyId),

    /// The property does not exist, or the id is stale.
    #[error("unknown property: {0}")]
    UnknownProperty(PropertyId),

    /// The value kind does not match the node's declared kind.
    #[error("type mismatch on {property}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The property being written.
        property: PropertyId,
        /// The kind declared when the node was created.
        expected: ValueKind,
        /// The kind that was supplied.
        found: ValueKind,
    },

    /// Installing the expression would close a dependency cycle.
    #[error("cyclic dependency: {property} is reachable from its dependency {via}")]
    CyclicDependency {
        /// The property whose expression was rejected.
        property: PropertyId,
        /// The declared dependency that leads back to `property`.
        via: PropertyId,
    },

    /// A write carried a timestamp older than the node's last update.
    #[error("out of order timestamp on {property}: last update {last}, attempted {attempted}")]
    OutOfOrderTimestamp {
        /// The property being written.
        property: PropertyId,
        /// The node's `last_updated`.
        last: Timestamp,
        /// The rejected timestamp.
        attempted: Timestamp,
    },

    /// Another live thread already holds this singleton kind.
    #[error("thread kind {kind} is already held by {holder:?}")]
    DuplicateSingleton {
        /// The singleton kind requested.
        kind: ThreadKind,
        /// The thread currently holding it.
        holder: ThreadId,
    },

    /// A dependency edge has no matching subscriber edge, or vice versa.
    #[error("asymmetric edge between {from} and {to}")]
    AsymmetricEdge {
        /// Node holding the edge.
        from: PropertyId,
        /// Node the edge points at.
        to: PropertyId,
    },

    /// The channel was closed; treated as clean termination.
    #[error("channel closed")]
    ChannelClosed,
}

impl CoreError {
    /// Returns true for errors caused by a mis-ordered clock or batching bug.
    #[must_use]
    pub const fn is_timestamp_error(&self) -> bool {
        matches!(self, Self::OutOfOrderTimestamp { .. })
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
