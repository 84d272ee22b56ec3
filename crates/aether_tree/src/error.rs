//! Error types for the tree crate.

use thiserror::Error;

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors that can occur while addressing the tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A dimension contained an empty step (e.g. `a::b`).
    #[error("empty step at position {position} in dimension {dimension:?}")]
    EmptyStep {
        /// The offending dimension text.
        dimension: String,
        /// Zero-based index of the empty step.
        position: usize,
    },

    /// A step contained a reserved character.
    #[error("invalid step {step:?}: steps may not contain ':' or '/'")]
    InvalidStep {
        /// The offending step.
        step: String,
    },
}

impl TreeError {
    /// Create an invalid step error.
    pub fn invalid_step(step: impl Into<String>) -> Self {
        Self::InvalidStep { step: step.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TreeError::EmptyStep {
            dimension: "a::b".into(),
            position: 1,
        };
        assert!(err.to_string().contains("position 1"));
        assert!(TreeError::invalid_step("x:y").to_string().contains("x:y"));
    }
}
