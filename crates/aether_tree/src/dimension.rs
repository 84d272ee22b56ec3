//! Dimensions: paths of named steps into the value tree.

use crate::error::{TreeError, TreeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between steps in the textual form of a dimension.
pub const STEP_SEPARATOR: char = ':';

/// A path into the value tree.
///
/// The root of the tree is the empty dimension. The textual form joins
/// steps with `:` (`rooms:lobby:topic`); a single leading `/` is accepted
/// so that URL paths parse directly.
///
/// Dimensions order lexicographically by step, so an ancestor always sorts
/// before its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimension(Vec<String>);

/// How two positions in the tree relate to each other.
///
/// The carried dimension is the relative path from the ancestor down to
/// the other position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestry {
    /// `self` is a strict ancestor of `other`.
    Ancestor(Dimension),
    /// Both positions are identical.
    Same,
    /// `self` is a strict descendant of `other`.
    Descendant(Dimension),
}

impl Dimension {
    /// The root dimension.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a dimension from steps, validating each one.
    pub fn from_steps<I, S>(steps: I) -> TreeResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for (position, step) in steps.into_iter().enumerate() {
            let step = step.into();
            if step.is_empty() {
                return Err(TreeError::EmptyStep {
                    dimension: out.join(":"),
                    position,
                });
            }
            if step.contains(STEP_SEPARATOR) || step.contains('/') {
                return Err(TreeError::invalid_step(step));
            }
            out.push(step);
        }
        Ok(Self(out))
    }

    /// Parses the textual form (`a:b:c`, optionally prefixed with `/`).
    pub fn parse(text: &str) -> TreeResult<Self> {
        let trimmed = text.strip_prefix('/').unwrap_or(text);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut steps = Vec::new();
        for (position, step) in trimmed.split(STEP_SEPARATOR).enumerate() {
            if step.is_empty() {
                return Err(TreeError::EmptyStep {
                    dimension: text.to_string(),
                    position,
                });
            }
            if step.contains('/') {
                return Err(TreeError::invalid_step(step));
            }
            steps.push(step.to_string());
        }
        Ok(Self(steps))
    }

    /// Returns the steps of this dimension.
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Returns the number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if this is the root dimension.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the dimension one step below this one.
    ///
    /// The step is taken as-is; callers pass keys that already live in a tree.
    pub fn child(&self, step: impl Into<String>) -> Self {
        let mut steps = self.0.clone();
        steps.push(step.into());
        Self(steps)
    }

    /// Appends a relative dimension to this one.
    pub fn join(&self, relative: &Dimension) -> Self {
        let mut steps = self.0.clone();
        steps.extend(relative.0.iter().cloned());
        Self(steps)
    }

    /// Returns true if `prefix` is this dimension or one of its ancestors.
    pub fn starts_with(&self, prefix: &Dimension) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Returns the path from `prefix` down to this dimension.
    pub fn strip_prefix(&self, prefix: &Dimension) -> Option<Dimension> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }

    /// Computes how this position relates to `other`.
    ///
    /// Returns `None` when neither is an ancestor of the other.
    pub fn ancestry(&self, other: &Dimension) -> Option<Ancestry> {
        if self.0 == other.0 {
            Some(Ancestry::Same)
        } else if let Some(path) = other.strip_prefix(self) {
            Some(Ancestry::Ancestor(path))
        } else {
            self.strip_prefix(other).map(Ancestry::Descendant)
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        f.write_str(&self.0.join(":"))
    }
}

impl FromStr for Dimension {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(text: &str) -> Dimension {
        text.parse().unwrap()
    }

    #[test]
    fn parse_forms() {
        assert!(dim("").is_root());
        assert!(dim("/").is_root());
        assert_eq!(dim("a:b:c").steps(), &["a", "b", "c"]);
        assert_eq!(dim("/a:b"), dim("a:b"));
    }

    #[test]
    fn parse_rejects_empty_steps() {
        assert!(matches!(
            Dimension::parse("a::b"),
            Err(TreeError::EmptyStep { position: 1, .. })
        ));
        assert!(Dimension::parse("a:b/c").is_err());
    }

    #[test]
    fn from_steps_validates() {
        assert!(Dimension::from_steps(["a", "b"]).is_ok());
        assert!(Dimension::from_steps(["a", ""]).is_err());
        assert!(Dimension::from_steps(["a:b"]).is_err());
    }

    #[test]
    fn display_roundtrips() {
        assert_eq!(dim("x:y").to_string(), "x:y");
        assert_eq!(Dimension::root().to_string(), "/");
        assert_eq!(dim(&dim("x:y").to_string()), dim("x:y"));
    }

    #[test]
    fn ancestry_relations() {
        assert_eq!(dim("a").ancestry(&dim("a")), Some(Ancestry::Same));
        assert_eq!(
            dim("a").ancestry(&dim("a:b:c")),
            Some(Ancestry::Ancestor(dim("b:c")))
        );
        assert_eq!(
            dim("a:b:c").ancestry(&dim("a")),
            Some(Ancestry::Descendant(dim("b:c")))
        );
        assert_eq!(dim("a:b").ancestry(&dim("a:c")), None);
        assert_eq!(
            Dimension::root().ancestry(&dim("q")),
            Some(Ancestry::Ancestor(dim("q")))
        );
    }

    #[test]
    fn ancestors_sort_first() {
        let mut dims = vec![dim("a:b"), dim("b"), dim("a"), Dimension::root()];
        dims.sort();
        assert_eq!(dims, vec![Dimension::root(), dim("a"), dim("a:b"), dim("b")]);
    }

    #[test]
    fn join_and_strip() {
        let base = dim("a");
        let joined = base.join(&dim("b:c"));
        assert_eq!(joined, dim("a:b:c"));
        assert_eq!(joined.strip_prefix(&base), Some(dim("b:c")));
        assert!(joined.starts_with(&base));
        assert_eq!(base.child("z"), dim("a:z"));
    }
}
