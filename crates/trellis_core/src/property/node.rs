//! Graph nodes.

use std::collections::BTreeSet;

use super::expression::Expression;
use super::id::PropertyId;
use super::value::{PropertyValue, ValueKind};
use crate::clock::Timestamp;

/// Where a node's value comes from.
#[derive(Clone, Debug)]
pub enum NodeSource {
    /// A literal value set directly.
    Value,
    /// Computed from other nodes.
    Expression(Expression),
}

/// A single property.
#[derive(Clone, Debug)]
pub struct PropertyNode {
    pub(crate) id: PropertyId,
    pub(crate) kind: ValueKind,
    pub(crate) source: NodeSource,
    pub(crate) value: PropertyValue,
    pub(crate) dependencies: Vec<PropertyId>,
    pub(crate) subscribers: BTreeSet<PropertyId>,
    pub(crate) last_updated: Timestamp,
    pub(crate) dirty: bool,
}

impl PropertyNode {
    pub(crate) fn with_value(id: PropertyId, value: PropertyValue, t: Timestamp) -> Self {
        Self {
            id,
            kind: value.kind(),
            source: NodeSource::Value,
            value,
            dependencies: Vec::new(),
            subscribers: BTreeSet::new(),
            last_updated: t,
            dirty: false,
        }
    }

    /// The node's id.
    #[must_use]
    pub const fn id(&self) -> PropertyId {
        self.id
    }

    /// The kind fixed at creation.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Value or expression.
    #[must_use]
    pub const fn source(&self) -> &NodeSource {
        &self.source
    }

    /// Returns true if the node is computed.
    #[must_use]
    pub const fn is_expression(&self) -> bool {
        matches!(self.source, NodeSource::Expression(_))
    }

    /// The cached value.
    #[must_use]
    pub const fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// What this node reads, in declared order.
    #[must_use]
    pub fn dependencies(&self) -> &[PropertyId] {
        &self.dependencies
    }

    /// Who reads this node.
    #[must_use]
    pub const fn subscribers(&self) -> &BTreeSet<PropertyId> {
        &self.subscribers
    }

    /// Timestamp of the last value change.
    #[must_use]
    pub const fn last_updated(&self) -> Timestamp {
        self.last_updated
    }

    /// Returns true while the node awaits re-evaluation.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }
}
