//! The node-operation interface and its in-memory implementation.

use crate::delta::Delta;
use crate::dimension::{Ancestry, Dimension};
use crate::value::Value;

/// The tree an aether server mutates.
///
/// Implementations only store values. Ordering, merging and notification
/// are the engine's business.
///
/// # Invariants
///
/// - Reading a dimension that was never written yields an empty value
/// - `assign` replaces the whole subtree at the dimension
/// - `apply` leaves the same result as [`Value::apply`] on the snapshot
/// - `clear` removes the datum and every descendant
///
/// # Implementors
///
/// - [`MemoryTree`] - keeps the whole tree in a single [`Value`]
pub trait ValueTree: Send {
    /// Replaces the subtree at `dimension`.
    fn assign(&mut self, dimension: &Dimension, value: Value);

    /// Applies a delta at `dimension`.
    fn apply(&mut self, dimension: &Dimension, delta: &Delta);

    /// Clears the subtree at `dimension`.
    fn clear(&mut self, dimension: &Dimension);

    /// Returns a snapshot of the subtree at `dimension`.
    fn value(&self, dimension: &Dimension) -> Value;

    /// Makes sure the node at `dimension` exists.
    fn ensure(&mut self, dimension: &Dimension);

    /// Computes how two positions relate.
    ///
    /// Dimensions are structural, so the default compares paths.
    fn ancestry(&self, a: &Dimension, b: &Dimension) -> Option<Ancestry> {
        a.ancestry(b)
    }
}

/// An in-memory value tree.
///
/// # Example
///
/// ```rust
/// use aether_tree::{Delta, Dimension, MemoryTree, ValueTree};
///
/// let mut tree = MemoryTree::new();
/// let dim = Dimension::parse("counter").unwrap();
/// tree.apply(&dim, &Delta::set(1));
/// assert_eq!(tree.value(&dim).data().and_then(|d| d.as_integer()), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    root: Value,
}

impl MemoryTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tree with pre-existing contents.
    #[must_use]
    pub fn with_root(root: Value) -> Self {
        Self { root }
    }

    /// Returns the whole tree.
    pub fn root(&self) -> &Value {
        &self.root
    }
}

impl ValueTree for MemoryTree {
    fn assign(&mut self, dimension: &Dimension, value: Value) {
        self.root.assign_at(dimension, value);
    }

    fn apply(&mut self, dimension: &Dimension, delta: &Delta) {
        self.root.apply_at(dimension, delta);
    }

    fn clear(&mut self, dimension: &Dimension) {
        self.root.clear_at(dimension);
    }

    fn value(&self, dimension: &Dimension) -> Value {
        self.root.snapshot(dimension)
    }

    fn ensure(&mut self, dimension: &Dimension) {
        self.root.entry(dimension);
    }
}
