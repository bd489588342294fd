//! Expressions: a callable plus its declared dependencies.

use std::fmt;
use std::sync::Arc;

use super::id::PropertyId;
use super::value::{Aabr, Color, PropertyValue, Vec2, Vec4};

type ExprFn = dyn Fn(&Inputs<'_>) -> PropertyValue + Send + Sync;

/// A computed value over other properties.
///
/// Cloning shares the callable; two expressions are the *same* when they share
/// the callable and declare the same dependencies in the same order.
#[derive(Clone)]
pub struct Expression {
    func: Arc<ExprFn>,
    deps: Vec<PropertyId>,
}

impl Expression {
    /// Creates an expression reading `deps` (in that order).
    pub fn new<F>(deps: impl Into<Vec<PropertyId>>, func: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> PropertyValue + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            deps: deps.into(),
        }
    }

    /// An expression with no inputs that always yields `value`.
    #[must_use]
    pub fn constant(value: PropertyValue) -> Self {
        Self::new(Vec::new(), move |_| value.clone())
    }

    /// The declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[PropertyId] {
        &self.deps
    }

    /// Evaluates the callable.
    #[must_use]
    pub fn evaluate(&self, inputs: &Inputs<'_>) -> PropertyValue {
        (self.func)(inputs)
    }

    /// Returns true if both share the callable and the dependency list.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func) && self.deps == other.deps
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Read-only view of an expression's dependency values, in declared order.
#[derive(Debug)]
pub struct Inputs<'a> {
    ids: &'a [PropertyId],
    values: Vec<&'a PropertyValue>,
}

impl<'a> Inputs<'a> {
    /// Pairs `ids` with their `values`. Both must have the same length.
    #[must_use]
    pub fn new(ids: &'a [PropertyId], values: Vec<&'a PropertyValue>) -> Self {
        debug_assert_eq!(ids.len(), values.len());
        Self { ids, values }
    }

    /// Number of inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the expression has no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `index`-th input.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a PropertyValue> {
        self.values.get(index).copied()
    }

    /// The input bound to `id`.
    #[must_use]
    pub fn value(&self, id: PropertyId) -> Option<&'a PropertyValue> {
        self.ids
            .iter()
            .position(|&dep| dep == id)
            .and_then(|index| self.get(index))
    }

    /// Iterates over `(id, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &'a PropertyValue)> + '_ {
        self.ids.iter().copied().zip(self.values.iter().copied())
    }

    /// The `index`-th input as a bool.
    #[must_use]
    pub fn bool(&self, index: usize) -> Option<bool> {
        self.get(index).and_then(PropertyValue::as_bool)
    }

    /// The `index`-th input as an integer.
    #[must_use]
    pub fn int(&self, index: usize) -> Option<i64> {
        self.get(index).and_then(PropertyValue::as_int)
    }

    /// The `index`-th input as a float.
    #[must_use]
    pub fn float(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(PropertyValue::as_float)
    }

    /// The `index`-th input as a string.
    #[must_use]
    pub fn str(&self, index: usize) -> Option<&'a str> {
        self.get(index).and_then(PropertyValue::as_str)
    }

    /// The `index`-th input as a 2D vector.
    #[must_use]
    pub fn vec2(&self, index: usize) -> Option<Vec2> {
        self.get(index).and_then(PropertyValue::as_vec2)
    }

    /// The `index`-th input as a 4D vector.
    #[must_use]
    pub fn vec4(&self, index: usize) -> Option<Vec4> {
        self.get(index).and_then(PropertyValue::as_vec4)
    }

    /// The `index`-th input as a color.
    #[must_use]
    pub fn color(&self, index: usize) -> Option<Color> {
        self.get(index).and_then(PropertyValue::as_color)
    }

    /// The `index`-th input as a rectangle.
    #[must_use]
    pub fn aabr(&self, index: usize) -> Option<Aabr> {
        self.get(index).and_then(PropertyValue::as_aabr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_reads_inputs_in_order() {
        let a = PropertyId::new(1, 0);
        let b = PropertyId::new(2, 0);
        let expr = Expression::new(vec![a, b], |inputs| {
            PropertyValue::Int(inputs.int(0).unwrap_or(0) - inputs.int(1).unwrap_or(0))
        });

        let ids = [a, b];
        let va = PropertyValue::Int(10);
        let vb = PropertyValue::Int(3);
        let inputs = Inputs::new(&ids, vec![&va, &vb]);
        assert_eq!(expr.evaluate(&inputs), PropertyValue::Int(7));
        assert_eq!(inputs.value(b), Some(&vb));
        assert_eq!(inputs.value(PropertyId::new(9, 0)), None);
    }

    #[test]
    fn test_sameness() {
        let a = PropertyId::new(1, 0);
        let expr = Expression::new(vec![a], |_| PropertyValue::Bool(true));
        let copy = expr.clone();
        assert!(expr.same_as(&copy));

        let lookalike = Expression::new(vec![a], |_| PropertyValue::Bool(true));
        assert!(!expr.same_as(&lookalike));
    }

    #[test]
    fn test_constant() {
        let expr = Expression::constant(PropertyValue::from("fixed"));
        assert!(expr.dependencies().is_empty());
        let inputs = Inputs::new(&[], Vec::new());
        assert_eq!(expr.evaluate(&inputs).as_str(), Some("fixed"));
    }
}
