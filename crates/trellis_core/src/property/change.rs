//! Change-sets: which properties changed during an operation or batch.

use std::collections::BTreeSet;

use super::id::PropertyId;
use crate::clock::Timestamp;

/// Ids whose value changed, and ids that were deleted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    timestamp: Timestamp,
    changed: BTreeSet<PropertyId>,
    removed: BTreeSet<PropertyId>,
}

impl ChangeSet {
    /// Creates an empty change-set stamped `timestamp`.
    #[must_use]
    pub const fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            changed: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    /// The latest timestamp merged into this set.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Records a value change.
    pub fn record_changed(&mut self, id: PropertyId) {
        self.removed.remove(&id);
        self.changed.insert(id);
    }

    /// Records a deletion.
    pub fn record_removed(&mut self, id: PropertyId) {
        self.changed.remove(&id);
        self.removed.insert(id);
    }

    /// Folds `other` in. Later events win: a change after a removal
    /// un-removes the id, a removal drops an earlier change.
    pub fn merge(&mut self, other: Self) {
        self.timestamp = self.timestamp.max(other.timestamp);
        for id in other.changed {
            self.record_changed(id);
        }
        for id in other.removed {
            self.record_removed(id);
        }
    }

    /// Returns true if `id` changed.
    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.changed.contains(&id)
    }

    /// Returns true if `id` was deleted.
    #[must_use]
    pub fn was_removed(&self, id: PropertyId) -> bool {
        self.removed.contains(&id)
    }

    /// Changed ids in ascending order.
    #[must_use]
    pub const fn changed(&self) -> &BTreeSet<PropertyId> {
        &self.changed
    }

    /// Deleted ids in ascending order.
    #[must_use]
    pub const fn removed(&self) -> &BTreeSet<PropertyId> {
        &self.removed
    }

    /// Iterates over changed ids.
    pub fn iter(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.changed.iter().copied()
    }

    /// Number of changed plus deleted ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len() + self.removed.len()
    }

    /// Returns true if nothing changed or was deleted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(serial: u64) -> PropertyId {
        PropertyId::new(serial, 0)
    }

    #[test]
    fn test_merge_keeps_latest_timestamp() {
        let mut a = ChangeSet::new(Timestamp::from_nanos(10));
        a.record_changed(id(1));
        let mut b = ChangeSet::new(Timestamp::from_nanos(5));
        b.record_changed(id(2));

        a.merge(b);
        assert_eq!(a.timestamp(), Timestamp::from_nanos(10));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![id(1), id(2)]);
    }

    #[test]
    fn test_removal_overrides_change() {
        let mut set = ChangeSet::new(Timestamp::ZERO);
        set.record_changed(id(1));
        let mut later = ChangeSet::new(Timestamp::ZERO);
        later.record_removed(id(1));
        set.merge(later);

        assert!(!set.contains(id(1)));
        assert!(set.was_removed(id(1)));
        assert_eq!(set.len(), 1);
    }
}
