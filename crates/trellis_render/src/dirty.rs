//! Deduplicated FIFO of windows awaiting a redraw.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::window::{Window, WindowId};

/// Windows waiting to be drawn, oldest first, each at most once.
#[derive(Default)]
pub struct WindowDirtySet {
    order: VecDeque<Arc<dyn Window>>,
    members: HashSet<WindowId>,
}

impl WindowDirtySet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `window` unless it is already queued. Returns true if added.
    pub fn insert(&mut self, window: Arc<dyn Window>) -> bool {
        if !self.members.insert(window.id()) {
            return false;
        }
        self.order.push_back(window);
        true
    }

    /// Removes and returns the oldest window.
    pub fn pop_front(&mut self) -> Option<Arc<dyn Window>> {
        let window = self.order.pop_front()?;
        self.members.remove(&window.id());
        Some(window)
    }

    /// Returns true if `id` is queued.
    #[must_use]
    pub fn contains(&self, id: WindowId) -> bool {
        self.members.contains(&id)
    }

    /// Ids in draw order.
    pub fn ids(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.order.iter().map(|window| window.id())
    }

    /// Number of queued windows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drops every queued window.
    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

impl fmt::Debug for WindowDirtySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessWindow;
    use trellis_core::Aabr;

    fn window(raw: u64) -> Arc<dyn Window> {
        Arc::new(HeadlessWindow::new(WindowId::new(raw), Aabr::from_size(1.0, 1.0)))
    }

    #[test]
    fn test_dedup_keeps_first_position() {
        let mut set = WindowDirtySet::new();
        assert!(set.insert(window(1)));
        assert!(set.insert(window(2)));
        assert!(!set.insert(window(1)));

        assert_eq!(set.ids().collect::<Vec<_>>(), vec![WindowId::new(1), WindowId::new(2)]);
    }

    #[test]
    fn test_reinsert_after_pop_goes_to_back() {
        let mut set = WindowDirtySet::new();
        set.insert(window(1));
        set.insert(window(2));

        let first = set.pop_front().unwrap();
        assert_eq!(first.id(), WindowId::new(1));
        assert!(!set.contains(WindowId::new(1)));

        set.insert(first);
        assert_eq!(set.ids().collect::<Vec<_>>(), vec![WindowId::new(2), WindowId::new(1)]);
    }
}
