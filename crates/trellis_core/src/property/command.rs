//! # Commands and Batches
//!
//! Every mutation of the graph is reified as a [`Command`]. Commands travel in
//! [`Batch`]es that share one timestamp; the graph applies a batch as a unit
//! and observers only ever see its merged result.
//!
//! ```text
//! Batch @ t=10
//! ├── Create(a, Int 2)
//! ├── SetExpression(b, [a] -> a * 3)
//! └── Delete(old)
//! ```

use super::change::ChangeSet;
use super::expression::Expression;
use super::id::PropertyId;
use super::value::PropertyValue;
use crate::clock::Timestamp;
use crate::error::CoreError;

/// The mutation a command performs.
#[derive(Clone, Debug)]
pub enum CommandOp {
    /// Create a value node.
    Create(PropertyValue),
    /// Replace the value (clears any expression).
    SetValue(PropertyValue),
    /// Install an expression.
    SetExpression(Expression),
    /// Remove the node.
    Delete,
}

impl CommandOp {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::SetValue(_) => "set_value",
            Self::SetExpression(_) => "set_expression",
            Self::Delete => "delete",
        }
    }
}

/// A single reified mutation.
#[derive(Clone, Debug)]
pub struct Command {
    /// Target property.
    pub property: PropertyId,
    /// When the mutation happened.
    pub timestamp: Timestamp,
    /// What to do.
    pub op: CommandOp,
}

impl Command {
    /// Creates a command.
    #[must_use]
    pub const fn new(property: PropertyId, timestamp: Timestamp, op: CommandOp) -> Self {
        Self {
            property,
            timestamp,
            op,
        }
    }
}

/// Ordered commands sharing one timestamp.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    timestamp: Timestamp,
    commands: Vec<Command>,
}

impl Batch {
    /// Creates an empty batch.
    #[must_use]
    pub const fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            commands: Vec::new(),
        }
    }

    /// Starts a builder for a batch at `timestamp`.
    #[must_use]
    pub const fn builder(timestamp: Timestamp) -> BatchBuilder {
        BatchBuilder {
            batch: Self::new(timestamp),
        }
    }

    /// Appends `op` on `property`, stamped with the batch timestamp.
    pub fn push(&mut self, property: PropertyId, op: CommandOp) {
        self.commands
            .push(Command::new(property, self.timestamp, op));
    }

    /// The batch timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Commands in application order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if the batch has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Fluent construction of a [`Batch`].
#[derive(Debug)]
#[must_use = "a builder does nothing until built and scheduled"]
pub struct BatchBuilder {
    batch: Batch,
}

impl BatchBuilder {
    /// Creates a value node.
    pub fn create(mut self, property: PropertyId, initial: impl Into<PropertyValue>) -> Self {
        self.batch
            .push(property, CommandOp::Create(initial.into()));
        self
    }

    /// Sets a value.
    pub fn set_value(mut self, property: PropertyId, value: impl Into<PropertyValue>) -> Self {
        self.batch
            .push(property, CommandOp::SetValue(value.into()));
        self
    }

    /// Installs an expression.
    pub fn set_expression(mut self, property: PropertyId, expr: Expression) -> Self {
        self.batch.push(property, CommandOp::SetExpression(expr));
        self
    }

    /// Deletes a node.
    pub fn delete(mut self, property: PropertyId) -> Self {
        self.batch.push(property, CommandOp::Delete);
        self
    }

    /// Finishes the batch.
    #[must_use]
    pub fn build(self) -> Batch {
        self.batch
    }
}

/// Result of applying a batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Merged change-set of every applied command.
    pub changes: ChangeSet,
    /// Commands that succeeded.
    pub applied: usize,
    /// Errors of the commands that were absorbed.
    pub rejected: Vec<CoreError>,
}

impl BatchOutcome {
    pub(crate) const fn new(timestamp: Timestamp) -> Self {
        Self {
            changes: ChangeSet::new(timestamp),
            applied: 0,
            rejected: Vec::new(),
        }
    }

    /// Returns true if no command was rejected.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_stamps_every_command() {
        let t = Timestamp::from_millis(3);
        let a = PropertyId::new(1, 0);
        let batch = Batch::builder(t)
            .create(a, 1_i64)
            .set_value(a, 2_i64)
            .delete(a)
            .build();

        assert_eq!(batch.len(), 3);
        assert!(batch.commands().iter().all(|c| c.timestamp == t));
        let names: Vec<_> = batch.commands().iter().map(|c| c.op.name()).collect();
        assert_eq!(names, vec!["create", "set_value", "delete"]);
    }
}
