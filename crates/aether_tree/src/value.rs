//! Node values and subtree snapshots.

use crate::delta::Delta;
use crate::dimension::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The datum stored at a single node.
///
/// Floats are intentionally not supported so that values compare and
/// encode deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datum {
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
}

impl Datum {
    /// Get this datum as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this datum as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Datum::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this datum as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Datum::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Bool(b) => write!(f, "{b}"),
            Datum::Integer(n) => write!(f, "{n}"),
            Datum::Text(s) => write!(f, "{s:?}"),
            Datum::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for Datum {
    fn from(b: bool) -> Self {
        Datum::Bool(b)
    }
}

impl From<i64> for Datum {
    fn from(n: i64) -> Self {
        Datum::Integer(n)
    }
}

impl From<i32> for Datum {
    fn from(n: i32) -> Self {
        Datum::Integer(i64::from(n))
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::Text(s.to_string())
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Datum::Text(s)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(b: Vec<u8>) -> Self {
        Datum::Bytes(b)
    }
}

/// A node of the tree together with everything below it.
///
/// Values are used both as the payload of an assign operation and as the
/// snapshots carried by notifications. A missing node and an empty node are
/// observationally the same; [`Value::pruned`] normalises one into the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Datum>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    children: BTreeMap<String, Value>,
}

impl Value {
    /// An empty value: no datum, no children.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A value holding a single datum.
    pub fn leaf(datum: impl Into<Datum>) -> Self {
        Self {
            data: Some(datum.into()),
            children: BTreeMap::new(),
        }
    }

    /// Adds a child (builder style).
    pub fn with_child(mut self, step: impl Into<String>, child: Value) -> Self {
        self.children.insert(step.into(), child);
        self
    }

    /// Returns the datum stored at this node.
    pub fn data(&self) -> Option<&Datum> {
        self.data.as_ref()
    }

    /// Replaces the datum stored at this node.
    pub fn set_data(&mut self, datum: Option<Datum>) {
        self.data = datum;
    }

    /// Returns the direct children.
    pub fn children(&self) -> &BTreeMap<String, Value> {
        &self.children
    }

    /// Returns the direct child with the given step.
    pub fn child(&self, step: &str) -> Option<&Value> {
        self.children.get(step)
    }

    /// Returns true if this node holds nothing, at any depth.
    pub fn is_empty(&self) -> bool {
        self.data.is_none() && self.children.values().all(Value::is_empty)
    }

    /// Returns the value at a relative dimension, if the path exists.
    pub fn get(&self, dimension: &Dimension) -> Option<&Value> {
        dimension
            .steps()
            .iter()
            .try_fold(self, |node, step| node.children.get(step))
    }

    /// Returns a snapshot of the value at a relative dimension.
    ///
    /// A missing path yields an empty value.
    pub fn snapshot(&self, dimension: &Dimension) -> Value {
        self.get(dimension).cloned().unwrap_or_default()
    }

    /// Returns the node at a relative dimension, creating the path.
    pub fn entry(&mut self, dimension: &Dimension) -> &mut Value {
        dimension.steps().iter().fold(self, |node, step| {
            node.children.entry(step.clone()).or_default()
        })
    }

    /// Replaces the subtree at a relative dimension.
    pub fn assign_at(&mut self, dimension: &Dimension, value: Value) {
        *self.entry(dimension) = value;
    }

    /// Removes the datum and every child of this node.
    pub fn clear(&mut self) {
        self.data = None;
        self.children.clear();
    }

    /// Clears the subtree at a relative dimension.
    pub fn clear_at(&mut self, dimension: &Dimension) {
        self.entry(dimension).clear();
    }

    /// Applies a delta to this node.
    pub fn apply(&mut self, delta: &Delta) {
        if delta.clears_base() {
            self.data = None;
        }
        if delta.clears_dims() {
            self.children.clear();
        }
        if let Some(datum) = delta.data() {
            self.data = Some(datum.clone());
        }
        for (step, child) in delta.children() {
            self.children.entry(step.clone()).or_default().apply(child);
        }
    }

    /// Applies a delta at a relative dimension.
    pub fn apply_at(&mut self, dimension: &Dimension, delta: &Delta) {
        self.entry(dimension).apply(delta);
    }

    /// Returns a copy with every empty subtree removed.
    pub fn pruned(&self) -> Value {
        let children = self
            .children
            .iter()
            .filter(|(_, child)| !child.is_empty())
            .map(|(step, child)| (step.clone(), child.pruned()))
            .collect();
        Value {
            data: self.data.clone(),
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(text: &str) -> Dimension {
        text.parse().unwrap()
    }

    #[test]
    fn get_and_snapshot() {
        let value = Value::empty().with_child("a", Value::empty().with_child("b", Value::leaf(7)));
        assert_eq!(value.get(&dim("a:b")).and_then(Value::data), Some(&Datum::Integer(7)));
        assert!(value.get(&dim("a:c")).is_none());
        assert!(value.snapshot(&dim("a:c")).is_empty());
        assert_eq!(value.get(&Dimension::root()), Some(&value));
    }

    #[test]
    fn assign_at_creates_path() {
        let mut value = Value::empty();
        value.assign_at(&dim("x:y"), Value::leaf("hi"));
        assert_eq!(
            value.get(&dim("x:y")).and_then(Value::data),
            Some(&Datum::from("hi"))
        );
        assert!(value.get(&dim("x")).unwrap().data().is_none());
    }

    #[test]
    fn clear_at_keeps_siblings() {
        let mut value = Value::empty()
            .with_child("a", Value::leaf(1).with_child("deep", Value::leaf(2)))
            .with_child("b", Value::leaf(3));
        value.clear_at(&dim("a"));
        assert!(value.get(&dim("a")).unwrap().is_empty());
        assert_eq!(value.get(&dim("b")).and_then(Value::data), Some(&Datum::Integer(3)));
    }

    #[test]
    fn pruned_drops_empty_nodes() {
        let mut value = Value::leaf(1);
        value.entry(&dim("ghost:path"));
        assert_ne!(value, Value::leaf(1));
        assert_eq!(value.pruned(), Value::leaf(1));
    }

    #[test]
    fn datum_accessors() {
        assert_eq!(Datum::from("t").as_text(), Some("t"));
        assert_eq!(Datum::from(4).as_integer(), Some(4));
        assert_eq!(Datum::from(true).as_bool(), Some(true));
        assert_eq!(Datum::from(vec![1u8, 2]).to_string(), "<2 bytes>");
    }
}
