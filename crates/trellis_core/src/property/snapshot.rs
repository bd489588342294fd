//! Point-in-time copies of every value in a graph.

use std::collections::HashMap;

use super::id::PropertyId;
use super::value::PropertyValue;
use crate::clock::Timestamp;

/// Values copied out of a graph. Cheap to hand to other threads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    taken_at: Timestamp,
    values: HashMap<PropertyId, PropertyValue>,
}

impl GraphSnapshot {
    pub(crate) fn new(taken_at: Timestamp, values: HashMap<PropertyId, PropertyValue>) -> Self {
        Self { taken_at, values }
    }

    /// The newest `last_updated` among the copied nodes.
    #[must_use]
    pub const fn taken_at(&self) -> Timestamp {
        self.taken_at
    }

    /// The value of `id` at snapshot time.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.values.get(&id)
    }

    /// Returns true if `id` existed at snapshot time.
    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.values.contains_key(&id)
    }

    /// Iterates over all values in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &PropertyValue)> {
        self.values.iter().map(|(&id, value)| (id, value))
    }

    /// Number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the graph was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
