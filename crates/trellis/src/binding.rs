//! Window bindings: which windows depend on which properties.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use trellis_core::{ChangeSet, PropertyId};
use trellis_render::{Window, WindowId};

/// Many-to-many map from properties to the windows that display them.
#[derive(Default)]
pub struct WindowBindings {
    windows: HashMap<WindowId, Arc<dyn Window>>,
    by_property: HashMap<PropertyId, BTreeSet<WindowId>>,
    by_window: HashMap<WindowId, BTreeSet<PropertyId>>,
}

impl WindowBindings {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `window` to `properties`, adding to any existing binding.
    pub fn bind(&mut self, window: Arc<dyn Window>, properties: impl IntoIterator<Item = PropertyId>) {
        let id = window.id();
        self.windows.insert(id, window);
        let bound = self.by_window.entry(id).or_default();
        for property in properties {
            bound.insert(property);
            self.by_property.entry(property).or_default().insert(id);
        }
    }

    /// Removes every binding of `window`. Returns false if it was not bound.
    pub fn unbind(&mut self, window: WindowId) -> bool {
        let Some(properties) = self.by_window.remove(&window) else {
            return false;
        };
        for property in properties {
            if let Some(windows) = self.by_property.get_mut(&property) {
                windows.remove(&window);
                if windows.is_empty() {
                    self.by_property.remove(&property);
                }
            }
        }
        self.windows.remove(&window);
        true
    }

    /// Windows affected by `changes`, changed or removed, each once and in
    /// id order.
    #[must_use]
    pub fn affected(&self, changes: &ChangeSet) -> Vec<Arc<dyn Window>> {
        let ids: BTreeSet<WindowId> = changes
            .changed()
            .iter()
            .chain(changes.removed())
            .filter_map(|property| self.by_property.get(property))
            .flatten()
            .copied()
            .collect();
        ids.into_iter()
            .filter_map(|id| self.windows.get(&id).cloned())
            .collect()
    }

    /// Properties bound to `window`.
    pub fn properties(&self, window: WindowId) -> impl Iterator<Item = PropertyId> + '_ {
        self.by_window.get(&window).into_iter().flatten().copied()
    }

    /// Number of bound windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns true if no window is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl fmt::Debug for WindowBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.by_window.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{Aabr, Timestamp};
    use trellis_render::HeadlessWindow;

    fn window(raw: u64) -> Arc<dyn Window> {
        Arc::new(HeadlessWindow::new(WindowId::new(raw), Aabr::default()))
    }

    fn id(serial: u64) -> PropertyId {
        PropertyId::new(serial, 0)
    }

    #[test]
    fn test_shared_property_hits_each_window_once() {
        let mut bindings = WindowBindings::new();
        bindings.bind(window(2), [id(1), id(2)]);
        bindings.bind(window(1), [id(2)]);

        let mut changes = ChangeSet::new(Timestamp::from_nanos(1));
        changes.record_changed(id(1));
        changes.record_changed(id(2));

        let hit: Vec<_> = bindings.affected(&changes).iter().map(|w| w.id()).collect();
        assert_eq!(hit, vec![WindowId::new(1), WindowId::new(2)]);
    }

    #[test]
    fn test_removed_property_counts() {
        let mut bindings = WindowBindings::new();
        bindings.bind(window(1), [id(7)]);

        let mut changes = ChangeSet::new(Timestamp::from_nanos(1));
        changes.record_removed(id(7));
        assert_eq!(bindings.affected(&changes).len(), 1);
    }

    #[test]
    fn test_unbind() {
        let mut bindings = WindowBindings::new();
        bindings.bind(window(1), [id(1)]);
        assert!(bindings.unbind(WindowId::new(1)));
        assert!(!bindings.unbind(WindowId::new(1)));
        assert!(bindings.is_empty());

        let mut changes = ChangeSet::new(Timestamp::from_nanos(1));
        changes.record_changed(id(1));
        assert!(bindings.affected(&changes).is_empty());
    }
}
