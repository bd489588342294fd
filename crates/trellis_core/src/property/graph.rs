//! # Property Graph
//!
//! Central registry of [`PropertyNode`]s keyed by id serial.
//!
//! Every public mutation validates fully before touching any node, so a
//! rejected call leaves the graph exactly as it was.
//!
//! ## Propagation
//!
//! ```text
//! set_value(a)
//!   1. DFS over subscribers      -> dirty = {b, c, d}
//!   2. Kahn over dirty subgraph  -> order  = b, c, d
//!   3. re-evaluate in order, collect ids whose value changed
//! ```
//!
//! A node downstream of several changed paths is evaluated once, after all of
//! its dirty inputs.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use super::change::ChangeSet;
use super::command::{Batch, BatchOutcome, Command, CommandOp};
use super::expression::{Expression, Inputs};
use super::id::PropertyId;
use super::node::{NodeSource, PropertyNode};
use super::observer::{ObserverId, ObserverRegistry, PendingNotifications};
use super::snapshot::GraphSnapshot;
use super::value::PropertyValue;
use crate::clock::Timestamp;
use crate::error::{CoreError, CoreResult};

/// Dataflow graph of properties.
#[derive(Default)]
pub struct PropertyGraph {
    nodes: HashMap<u64, PropertyNode>,
    observers: ObserverRegistry,
}

impl PropertyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity),
            observers: ObserverRegistry::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Lookup helpers
    // ---------------------------------------------------------------------

    fn lookup(&self, id: PropertyId) -> CoreResult<&PropertyNode> {
        self.nodes
            .get(&id.serial())
            .filter(|node| node.id == id)
            .ok_or(CoreError::UnknownProperty(id))
    }

    fn lookup_mut(&mut self, id: PropertyId) -> CoreResult<&mut PropertyNode> {
        self.nodes
            .get_mut(&id.serial())
            .filter(|node| node.id == id)
            .ok_or(CoreError::UnknownProperty(id))
    }

    fn check_vacant(&self, id: PropertyId) -> CoreResult<()> {
        if id.is_invalid() {
            return Err(CoreError::UnknownProperty(id));
        }
        if self.nodes.contains_key(&id.serial()) {
            return Err(CoreError::DuplicateId(id));
        }
        Ok(())
    }

    fn check_order(node: &PropertyNode, t: Timestamp) -> CoreResult<()> {
        if t < node.last_updated {
            return Err(CoreError::OutOfOrderTimestamp {
                property: node.id,
                last: node.last_updated,
                attempted: t,
            });
        }
        Ok(())
    }

    fn inputs<'a>(&'a self, deps: &'a [PropertyId]) -> CoreResult<Inputs<'a>> {
        let values = deps
            .iter()
            .map(|&dep| self.lookup(dep).map(|node| &node.value))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Inputs::new(deps, values))
    }

    /// Returns true if `target` is reachable from `from` along dependency
    /// edges (`from` itself included).
    fn reaches(&self, from: PropertyId, target: PropertyId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id.serial()) {
                stack.extend(node.dependencies.iter().copied());
            }
        }
        false
    }

    fn check_acyclic(&self, id: PropertyId, deps: &[PropertyId]) -> CoreResult<()> {
        match deps.iter().find(|&&dep| self.reaches(dep, id)) {
            Some(&via) => Err(CoreError::CyclicDependency { property: id, via }),
            None => Ok(()),
        }
    }

    fn link(&mut self, subscriber: PropertyId, deps: &[PropertyId]) {
        for dep in deps {
            if let Some(node) = self.nodes.get_mut(&dep.serial()) {
                node.subscribers.insert(subscriber);
            }
        }
    }

    fn unlink(&mut self, subscriber: PropertyId, deps: &[PropertyId]) {
        for dep in deps {
            if let Some(node) = self.nodes.get_mut(&dep.serial()) {
                node.subscribers.remove(&subscriber);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    /// Creates a value node.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the id (or its serial) is taken.
    pub fn add_value(
        &mut self,
        id: PropertyId,
        value: PropertyValue,
        t: Timestamp,
    ) -> CoreResult<ChangeSet> {
        self.check_vacant(id)?;
        self.nodes
            .insert(id.serial(), PropertyNode::with_value(id, value, t));

        let mut changes = ChangeSet::new(t);
        changes.record_changed(id);
        Ok(changes)
    }

    /// Creates an expression node; its kind is the kind of the first result.
    ///
    /// # Errors
    ///
    /// `DuplicateId`, `UnknownProperty` for a missing dependency, or
    /// `CyclicDependency` if the expression reads itself.
    pub fn add_expression(
        &mut self,
        id: PropertyId,
        expr: Expression,
        t: Timestamp,
    ) -> CoreResult<ChangeSet> {
        self.check_vacant(id)?;
        if expr.dependencies().contains(&id) {
            return Err(CoreError::CyclicDependency {
                property: id,
                via: id,
            });
        }
        let value = expr.evaluate(&self.inputs(expr.dependencies())?);

        let deps = expr.dependencies().to_vec();
        let mut node = PropertyNode::with_value(id, value, t);
        node.dependencies.clone_from(&deps);
        node.source = NodeSource::Expression(expr);
        self.nodes.insert(id.serial(), node);
        self.link(id, &deps);

        let mut changes = ChangeSet::new(t);
        changes.record_changed(id);
        Ok(changes)
    }

    /// Sets a literal value. An expression node loses its expression and
    /// dependency edges.
    ///
    /// # Errors
    ///
    /// `UnknownProperty`, `OutOfOrderTimestamp`, `TypeMismatch`.
    pub fn set_value(
        &mut self,
        id: PropertyId,
        value: PropertyValue,
        t: Timestamp,
    ) -> CoreResult<ChangeSet> {
        let node = self.lookup(id)?;
        Self::check_order(node, t)?;
        if value.kind() != node.kind {
            return Err(CoreError::TypeMismatch {
                property: id,
                expected: node.kind,
                found: value.kind(),
            });
        }
        let unchanged = node.value == value;

        let node = self.lookup_mut(id)?;
        if node.is_expression() {
            node.source = NodeSource::Value;
            let old = std::mem::take(&mut node.dependencies);
            self.unlink(id, &old);
        }

        let mut changes = ChangeSet::new(t);
        if unchanged {
            return Ok(changes);
        }
        let node = self.lookup_mut(id)?;
        node.value = value;
        node.last_updated = node.last_updated.max(t);
        changes.record_changed(id);
        self.propagate(id, t, &mut changes);
        Ok(changes)
    }

    /// Installs an expression on an existing node.
    ///
    /// Installing the expression the node already carries is a no-op that
    /// returns an empty change-set.
    ///
    /// # Errors
    ///
    /// `UnknownProperty` (target or any dependency), `CyclicDependency`,
    /// `OutOfOrderTimestamp`, `TypeMismatch` if the result kind differs from
    /// the node's kind.
    pub fn set_expression(
        &mut self,
        id: PropertyId,
        expr: Expression,
        t: Timestamp,
    ) -> CoreResult<ChangeSet> {
        let node = self.lookup(id)?;
        if let NodeSource::Expression(current) = &node.source {
            if current.same_as(&expr) {
                return Ok(ChangeSet::new(t));
            }
        }
        let kind = node.kind;
        let last_updated = node.last_updated;

        let inputs = self.inputs(expr.dependencies())?;
        self.check_acyclic(id, expr.dependencies())?;
        let value = expr.evaluate(&inputs);
        if t < last_updated {
            return Err(CoreError::OutOfOrderTimestamp {
                property: id,
                last: last_updated,
                attempted: t,
            });
        }
        if value.kind() != kind {
            return Err(CoreError::TypeMismatch {
                property: id,
                expected: kind,
                found: value.kind(),
            });
        }

        let deps = expr.dependencies().to_vec();
        let node = self.lookup_mut(id)?;
        let old = std::mem::replace(&mut node.dependencies, deps.clone());
        node.source = NodeSource::Expression(expr);
        let changed = node.value != value;
        if changed {
            node.value = value;
            node.last_updated = node.last_updated.max(t);
        }
        self.unlink(id, &old);
        self.link(id, &deps);

        let mut changes = ChangeSet::new(t);
        if changed {
            changes.record_changed(id);
            self.propagate(id, t, &mut changes);
        }
        Ok(changes)
    }

    /// Removes a node.
    ///
    /// Subscribers are frozen: each keeps its last value and loses its
    /// expression and dependency edges.
    ///
    /// # Errors
    ///
    /// `UnknownProperty`.
    pub fn delete_property(&mut self, id: PropertyId) -> CoreResult<ChangeSet> {
        self.lookup(id)?;
        let node = self
            .nodes
            .remove(&id.serial())
            .ok_or(CoreError::UnknownProperty(id))?;
        self.unlink(id, &node.dependencies);

        for &sub in &node.subscribers {
            let Some(sub_node) = self.nodes.get_mut(&sub.serial()) else {
                continue;
            };
            sub_node.source = NodeSource::Value;
            let deps = std::mem::take(&mut sub_node.dependencies);
            self.unlink(sub, &deps);
            tracing::debug!(property = %sub, deleted = %id, "subscriber frozen at its last value");
        }

        let mut changes = ChangeSet::new(node.last_updated);
        changes.record_removed(id);
        Ok(changes)
    }

    /// Re-evaluates every transitive subscriber of `origin` in topological
    /// order, recording those whose value changed.
    fn propagate(&mut self, origin: PropertyId, t: Timestamp, changes: &mut ChangeSet) {
        let mut dirty = HashSet::new();
        let mut stack: Vec<PropertyId> = self
            .nodes
            .get(&origin.serial())
            .map(|node| node.subscribers.iter().copied().collect())
            .unwrap_or_default();
        while let Some(id) = stack.pop() {
            if !dirty.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(&id.serial()) {
                node.dirty = true;
                stack.extend(node.subscribers.iter().copied());
            }
        }
        if dirty.is_empty() {
            return;
        }

        let mut in_degree: HashMap<PropertyId, usize> = dirty
            .iter()
            .map(|&id| {
                let degree = self.nodes.get(&id.serial()).map_or(0, |node| {
                    node.dependencies
                        .iter()
                        .filter(|dep| dirty.contains(dep))
                        .collect::<BTreeSet<_>>()
                        .len()
                });
                (id, degree)
            })
            .collect();
        let mut ready: BTreeSet<PropertyId> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();

        while let Some(id) = ready.pop_first() {
            self.reevaluate(id, t, changes);
            let subscribers: Vec<PropertyId> = self
                .nodes
                .get(&id.serial())
                .map(|node| node.subscribers.iter().copied().collect())
                .unwrap_or_default();
            for sub in subscribers {
                if let Some(degree) = in_degree.get_mut(&sub) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.insert(sub);
                    }
                }
            }
        }
    }

    fn reevaluate(&mut self, id: PropertyId, t: Timestamp, changes: &mut ChangeSet) {
        let Some(node) = self.nodes.get(&id.serial()) else {
            return;
        };
        let kind = node.kind;
        let evaluated = match &node.source {
            NodeSource::Value => None,
            NodeSource::Expression(expr) => Some(
                self.inputs(&node.dependencies)
                    .map(|inputs| expr.evaluate(&inputs)),
            ),
        };

        let Some(node) = self.nodes.get_mut(&id.serial()) else {
            return;
        };
        node.dirty = false;
        match evaluated {
            None => {}
            Some(Err(err)) => {
                tracing::warn!(property = %id, error = %err, "expression inputs unavailable, keeping last value");
            }
            Some(Ok(value)) if value.kind() != kind => {
                tracing::warn!(
                    property = %id,
                    expected = %kind,
                    found = %value.kind(),
                    "expression returned the wrong kind, keeping last value"
                );
            }
            Some(Ok(value)) => {
                if node.value != value {
                    node.value = value;
                    node.last_updated = node.last_updated.max(t);
                    changes.record_changed(id);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation reports.
    pub fn apply_command(&mut self, command: &Command) -> CoreResult<ChangeSet> {
        let (id, t) = (command.property, command.timestamp);
        match &command.op {
            CommandOp::Create(initial) => self.add_value(id, initial.clone(), t),
            CommandOp::SetValue(value) => self.set_value(id, value.clone(), t),
            CommandOp::SetExpression(expr) => self.set_expression(id, expr.clone(), t),
            CommandOp::Delete => self.delete_property(id),
        }
    }

    /// Applies every command of `batch` in order.
    ///
    /// A failing command is logged and skipped; the rest of the batch still
    /// applies. Observers fire once, with the merged change-set.
    pub fn apply_batch(&mut self, batch: &Batch) -> BatchOutcome {
        let outcome = self.apply_batch_deferred(batch);
        self.pending_notifications(&outcome.changes).deliver();
        outcome
    }

    /// Applies `batch` like [`apply_batch`](Self::apply_batch) without
    /// running observers. Pair with
    /// [`pending_notifications`](Self::pending_notifications) to run them
    /// once the graph is no longer borrowed.
    pub fn apply_batch_deferred(&mut self, batch: &Batch) -> BatchOutcome {
        let mut outcome = BatchOutcome::new(batch.timestamp());
        for command in batch.commands() {
            match self.apply_command(command) {
                Ok(changes) => {
                    outcome.changes.merge(changes);
                    outcome.applied += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        property = %command.property,
                        op = command.op.name(),
                        error = %err,
                        "command rejected"
                    );
                    outcome.rejected.push(err);
                }
            }
        }

        tracing::debug!(
            timestamp = %batch.timestamp(),
            applied = outcome.applied,
            rejected = outcome.rejected.len(),
            changed = outcome.changes.len(),
            "batch applied"
        );
        outcome
    }

    /// The observer calls `changes` triggers, with current values captured.
    #[must_use]
    pub fn pending_notifications(&self, changes: &ChangeSet) -> PendingNotifications {
        self.observers.pending(changes, |id| self.get(id))
    }

    // ---------------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------------

    /// Calls `callback` after each batch that changes `property`.
    pub fn observe<F>(&mut self, property: PropertyId, callback: F) -> ObserverId
    where
        F: Fn(PropertyId, &PropertyValue) + Send + Sync + 'static,
    {
        self.observers.observe(property, callback)
    }

    /// Calls `callback` with the change-set of each batch that changed
    /// anything.
    pub fn observe_all<F>(&mut self, callback: F) -> ObserverId
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        self.observers.observe_all(callback)
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn unobserve(&mut self, observer: ObserverId) -> bool {
        self.observers.unobserve(observer)
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// The current value of `id`.
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.lookup(id).ok().map(|node| &node.value)
    }

    /// The node for `id`.
    #[must_use]
    pub fn node(&self, id: PropertyId) -> Option<&PropertyNode> {
        self.lookup(id).ok()
    }

    /// Returns true if `id` names a live node.
    #[must_use]
    pub fn contains(&self, id: PropertyId) -> bool {
        self.lookup(id).is_ok()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All live ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<PropertyId> {
        let mut ids: Vec<_> = self.nodes.values().map(|node| node.id).collect();
        ids.sort_unstable();
        ids
    }

    /// What `id` reads.
    #[must_use]
    pub fn dependencies(&self, id: PropertyId) -> Option<&[PropertyId]> {
        self.node(id).map(PropertyNode::dependencies)
    }

    /// Who reads `id`.
    #[must_use]
    pub fn subscribers(&self, id: PropertyId) -> Option<&BTreeSet<PropertyId>> {
        self.node(id).map(PropertyNode::subscribers)
    }

    /// When `id` last changed.
    #[must_use]
    pub fn last_updated(&self, id: PropertyId) -> Option<Timestamp> {
        self.node(id).map(PropertyNode::last_updated)
    }

    /// Copies every value.
    #[must_use]
    pub fn snapshot(&self) -> GraphSnapshot {
        let taken_at = self
            .nodes
            .values()
            .map(|node| node.last_updated)
            .max()
            .unwrap_or_default();
        let values = self
            .nodes
            .values()
            .map(|node| (node.id, node.value.clone()))
            .collect();
        GraphSnapshot::new(taken_at, values)
    }

    /// Checks the structural invariants: every dependency edge has its
    /// subscriber edge and vice versa, and the dependency graph is acyclic.
    ///
    /// # Errors
    ///
    /// `UnknownProperty` for a dangling edge, `AsymmetricEdge`, or
    /// `CyclicDependency` naming one node left on a cycle.
    pub fn validate(&self) -> CoreResult<()> {
        for node in self.nodes.values() {
            for &dep in &node.dependencies {
                if !self.lookup(dep)?.subscribers.contains(&node.id) {
                    return Err(CoreError::AsymmetricEdge {
                        from: node.id,
                        to: dep,
                    });
                }
            }
            for &sub in &node.subscribers {
                if !self.lookup(sub)?.dependencies.contains(&node.id) {
                    return Err(CoreError::AsymmetricEdge {
                        from: node.id,
                        to: sub,
                    });
                }
            }
        }

        // Kahn's algorithm over the whole graph.
        let mut in_degree: HashMap<PropertyId, usize> = self
            .nodes
            .values()
            .map(|node| {
                let distinct: BTreeSet<_> = node.dependencies.iter().collect();
                (node.id, distinct.len())
            })
            .collect();
        let mut ready: Vec<PropertyId> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut visited = 0;

        while let Some(id) = ready.pop() {
            visited += 1;
            for sub in &self.lookup(id)?.subscribers {
                if let Some(degree) = in_degree.get_mut(sub) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        ready.push(*sub);
                    }
                }
            }
        }

        if visited == self.nodes.len() {
            return Ok(());
        }
        let stuck = in_degree
            .iter()
            .find(|&(_, &degree)| degree > 0)
            .map(|(&id, _)| id);
        match stuck {
            Some(property) => {
                let via = self
                    .lookup(property)?
                    .dependencies
                    .iter()
                    .copied()
                    .find(|dep| in_degree.get(dep).is_some_and(|&d| d > 0))
                    .unwrap_or(property);
                Err(CoreError::CyclicDependency { property, via })
            }
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PropertyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyGraph")
            .field("nodes", &self.nodes.len())
            .field("observers", &self.observers)
            .finish()
    }
}
