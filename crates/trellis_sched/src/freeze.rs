//! Read-only access to a scheduler's graph from outside the EVENT thread.

use std::fmt;
use std::ops::Deref;

use trellis_core::{MutexGuard, PropertyGraph};

/// Scoped read access to the graph.
///
/// While the guard lives the EVENT thread cannot apply batches, so keep it
/// short. Dropping it releases the graph.
pub struct FreezeGuard<'a> {
    graph: MutexGuard<'a, PropertyGraph>,
}

impl<'a> FreezeGuard<'a> {
    pub(crate) fn new(graph: MutexGuard<'a, PropertyGraph>) -> Self {
        Self { graph }
    }
}

impl Deref for FreezeGuard<'_> {
    type Target = PropertyGraph;

    fn deref(&self) -> &PropertyGraph {
        &self.graph
    }
}

impl fmt::Debug for FreezeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FreezeGuard").field(&*self.graph).finish()
    }
}
