//! Composable change descriptions.

use crate::dimension::Dimension;
use crate::value::{Datum, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A change to a subtree, applied with [`Value::apply`].
///
/// Applying a delta to a node proceeds in a fixed order:
/// 1. `clear_base` removes the node's datum
/// 2. `clear_dims` removes all of the node's children
/// 3. `data`, if present, becomes the node's datum
/// 4. every child delta is applied to the child of the same name
///
/// Deltas compose: `a.compose(b)` applied once has the same effect as
/// applying `a` and then `b`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    clear_base: bool,
    #[serde(default)]
    clear_dims: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Datum>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, Delta>,
}

impl Delta {
    /// A delta that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// A delta that sets the datum of the node it is applied to.
    pub fn set(datum: impl Into<Datum>) -> Self {
        Self {
            data: Some(datum.into()),
            ..Self::default()
        }
    }

    /// A delta equivalent to clearing the node (clear-base + clear-dims).
    pub fn clear() -> Self {
        Self {
            clear_base: true,
            clear_dims: true,
            ..Self::default()
        }
    }

    /// A delta that removes only the node's datum.
    pub fn clear_base() -> Self {
        Self {
            clear_base: true,
            ..Self::default()
        }
    }

    /// A delta whose application leaves exactly `value` behind.
    pub fn replace(value: &Value) -> Self {
        Self {
            clear_base: true,
            clear_dims: true,
            data: value.data().cloned(),
            children: value
                .children()
                .iter()
                .map(|(step, child)| (step.clone(), Delta::replace(child)))
                .collect(),
        }
    }

    /// Nests `delta` so that it applies at `path` below the node.
    pub fn at(path: &Dimension, delta: Delta) -> Self {
        path.steps().iter().rev().fold(delta, |inner, step| Self {
            children: BTreeMap::from([(step.clone(), inner)]),
            ..Self::default()
        })
    }

    /// Adds a child delta (builder style).
    pub fn with_child(mut self, step: impl Into<String>, child: Delta) -> Self {
        self.children.insert(step.into(), child);
        self
    }

    /// Returns true if the node's datum is removed first.
    pub fn clears_base(&self) -> bool {
        self.clear_base
    }

    /// Returns true if the node's children are removed first.
    pub fn clears_dims(&self) -> bool {
        self.clear_dims
    }

    /// Returns the datum written to the node.
    pub fn data(&self) -> Option<&Datum> {
        self.data.as_ref()
    }

    /// Returns the child deltas.
    pub fn children(&self) -> &BTreeMap<String, Delta> {
        &self.children
    }

    /// Returns true if applying this delta changes nothing.
    pub fn is_noop(&self) -> bool {
        !self.clear_base
            && !self.clear_dims
            && self.data.is_none()
            && self.children.values().all(Delta::is_noop)
    }

    /// Folds `next` into this delta, so that applying `self` afterwards
    /// equals applying the old `self` followed by `next`.
    pub fn compose(&mut self, next: Delta) {
        if next.clear_base {
            self.clear_base = true;
            self.data = None;
        }
        if let Some(datum) = next.data {
            self.data = Some(datum);
        }
        if next.clear_dims {
            self.clear_dims = true;
            self.children = next.children;
        } else {
            for (step, child) in next.children {
                self.children.entry(step).or_default().compose(child);
            }
        }
    }

    /// Folds `next`, applied at `path` below the node, into this delta.
    pub fn compose_at(&mut self, path: &Dimension, next: Delta) {
        self.compose(Delta::at(path, next));
    }

    /// Folds an assignment of `value` at `path` into this delta.
    pub fn assign_at(&mut self, path: &Dimension, value: &Value) {
        self.compose_at(path, Delta::replace(value));
    }

    /// Folds a clear of the subtree at `path` into this delta.
    pub fn clear_at(&mut self, path: &Dimension) {
        self.compose_at(path, Delta::clear());
    }

    /// Returns true if applying this delta may change the node at `path`
    /// (or anything below it).
    pub fn touches(&self, path: &Dimension) -> bool {
        let mut node = self;
        for step in path.steps() {
            if node.clear_dims {
                return true;
            }
            match node.children.get(step) {
                Some(child) => node = child,
                None => return false,
            }
        }
        !node.is_noop()
    }
}
