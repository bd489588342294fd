//! Change observers.
//!
//! Callbacks run on whichever thread applied the batch (the EVENT thread under
//! a scheduler) after the whole batch is in. [`ObserverRegistry::pending`]
//! captures the callbacks and the values they will see, so the caller can
//! release the graph before running them with [`PendingNotifications::deliver`].

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::change::ChangeSet;
use super::id::PropertyId;
use super::value::PropertyValue;

type PropertyCallback = Arc<dyn Fn(PropertyId, &PropertyValue) + Send + Sync>;
type ChangeCallback = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

/// Handle returned by `observe`, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

/// Callbacks keyed by property, plus whole change-set callbacks.
#[derive(Default)]
pub struct ObserverRegistry {
    next: u64,
    by_property: HashMap<PropertyId, Vec<(ObserverId, PropertyCallback)>>,
    global: Vec<(ObserverId, ChangeCallback)>,
}

impl ObserverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&mut self) -> ObserverId {
        self.next += 1;
        ObserverId(self.next)
    }

    /// Calls `callback` with the new value whenever `property` changes.
    pub fn observe<F>(&mut self, property: PropertyId, callback: F) -> ObserverId
    where
        F: Fn(PropertyId, &PropertyValue) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.by_property
            .entry(property)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Calls `callback` with every non-empty change-set.
    pub fn observe_all<F>(&mut self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.global.push((id, Arc::new(callback)));
        id
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unobserve(&mut self, observer: ObserverId) -> bool {
        if let Some(pos) = self.global.iter().position(|(id, _)| *id == observer) {
            self.global.remove(pos);
            return true;
        }
        let mut found = false;
        self.by_property.retain(|_, list| {
            if let Some(pos) = list.iter().position(|(id, _)| *id == observer) {
                list.remove(pos);
                found = true;
            }
            !list.is_empty()
        });
        found
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.global.len() + self.by_property.values().map(Vec::len).sum::<usize>()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fires per-property callbacks for every changed id, then the
    /// whole-set callbacks. A panicking callback is logged and skipped.
    pub fn notify<'v>(
        &self,
        changes: &ChangeSet,
        value_of: impl Fn(PropertyId) -> Option<&'v PropertyValue>,
    ) {
        self.pending(changes, value_of).deliver();
    }

    /// Captures the callbacks `changes` triggers, with cloned values, without
    /// running any of them.
    #[must_use]
    pub fn pending<'v>(
        &self,
        changes: &ChangeSet,
        value_of: impl Fn(PropertyId) -> Option<&'v PropertyValue>,
    ) -> PendingNotifications {
        let mut pending = PendingNotifications::default();
        if changes.is_empty() {
            return pending;
        }
        for id in changes.iter() {
            let Some(callbacks) = self.by_property.get(&id) else {
                continue;
            };
            let Some(value) = value_of(id) else {
                continue;
            };
            let slot = pending.values.len();
            pending.values.push((id, value.clone()));
            pending.by_property.extend(
                callbacks
                    .iter()
                    .map(|(observer, callback)| (slot, *observer, Arc::clone(callback))),
            );
        }
        if !self.global.is_empty() {
            pending.changes = Some(changes.clone());
            pending.global.clone_from(&self.global);
        }
        pending
    }
}

/// Observer calls captured by [`ObserverRegistry::pending`].
#[derive(Default)]
pub struct PendingNotifications {
    values: Vec<(PropertyId, PropertyValue)>,
    by_property: Vec<(usize, ObserverId, PropertyCallback)>,
    changes: Option<ChangeSet>,
    global: Vec<(ObserverId, ChangeCallback)>,
}

impl PendingNotifications {
    /// Returns true if no callback would run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty() && self.global.is_empty()
    }

    /// Runs the captured callbacks: per-property ones in change order, then
    /// the whole-set ones.
    pub fn deliver(self) {
        for (slot, observer, callback) in &self.by_property {
            let Some((id, value)) = self.values.get(*slot) else {
                continue;
            };
            guarded(*observer, || callback(*id, value));
        }
        if let Some(changes) = &self.changes {
            for (observer, callback) in &self.global {
                guarded(*observer, || callback(changes));
            }
        }
    }
}

impl fmt::Debug for PendingNotifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingNotifications")
            .field("by_property", &self.by_property.len())
            .field("global", &self.global.len())
            .finish()
    }
}

fn guarded(observer: ObserverId, f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!(observer = observer.0, "observer panicked");
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_and_unobserve() {
        let hits = Arc::new(AtomicUsize::new(0));
        let a = PropertyId::new(1, 0);
        let value = PropertyValue::Int(1);

        let mut registry = ObserverRegistry::new();
        let counter = Arc::clone(&hits);
        let obs = registry.observe(a, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&hits);
        registry.observe_all(move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(registry.len(), 2);

        let mut changes = ChangeSet::new(Timestamp::ZERO);
        changes.record_changed(a);
        registry.notify(&changes, |_| Some(&value));
        assert_eq!(hits.load(Ordering::SeqCst), 11);

        assert!(registry.unobserve(obs));
        assert!(!registry.unobserve(obs));
        registry.notify(&changes, |_| Some(&value));
        assert_eq!(hits.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_others() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = ObserverRegistry::new();
        registry.observe_all(|_| panic!("boom"));
        let counter = Arc::clone(&hits);
        registry.observe_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut changes = ChangeSet::new(Timestamp::ZERO);
        changes.record_removed(PropertyId::new(1, 0));
        registry.notify(&changes, |_| None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pending_runs_nothing_until_delivered() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let a = PropertyId::new(1, 0);
        let mut registry = ObserverRegistry::new();
        let sink = Arc::clone(&seen);
        registry.observe(a, move |_, value| {
            sink.lock().unwrap().push(value.as_int());
        });

        let mut changes = ChangeSet::new(Timestamp::ZERO);
        changes.record_changed(a);
        let mut current = PropertyValue::Int(1);
        let pending = registry.pending(&changes, |_| Some(&current));
        assert!(!pending.is_empty());
        assert!(seen.lock().unwrap().is_empty());

        // the captured value is a copy
        current = PropertyValue::Int(2);
        pending.deliver();
        assert_eq!(*seen.lock().unwrap(), vec![Some(1)]);
        assert_eq!(current, PropertyValue::Int(2));

        let untouched = ChangeSet::new(Timestamp::ZERO);
        assert!(registry.pending(&untouched, |_| Some(&current)).is_empty());
    }
}
