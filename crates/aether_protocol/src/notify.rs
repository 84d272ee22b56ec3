//! NotifyToken: the batched changes one session receives for one operation.

use crate::error::{ProtocolError, ProtocolResult};
use crate::token::ParticipantId;
use aether_tree::{Ancestry, Dimension, Value};
use serde::{Deserialize, Serialize};

/// A tree snapshot carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Absolute position the snapshot was taken at.
    pub dimension: Dimension,
    /// The snapshot.
    pub value: Value,
}

/// A reference from a target into the node list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Index into [`NotifyToken::nodes`].
    pub index: usize,
    /// Path below the referenced node, when the target shares a node with
    /// an earlier, shallower target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<Dimension>,
}

/// One change for one participant.
///
/// `dimension` is relative to the participant's position and is present
/// only when the change happened below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A subtree was replaced.
    Assign {
        /// Receiving participant.
        participant: ParticipantId,
        /// New contents.
        node: NodeRef,
        /// Where, relative to the participant.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimension: Option<Dimension>,
    },
    /// A delta was applied.
    Apply {
        /// Receiving participant.
        participant: ParticipantId,
        /// Contents after the delta.
        node: NodeRef,
        /// Where, relative to the participant.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimension: Option<Dimension>,
    },
    /// A subtree was cleared.
    Clear {
        /// Receiving participant.
        participant: ParticipantId,
        /// Where, relative to the participant.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dimension: Option<Dimension>,
    },
    /// The participant was evicted.
    Kick {
        /// Receiving participant.
        participant: ParticipantId,
    },
}

impl Target {
    /// Returns the receiving participant.
    pub fn participant(&self) -> ParticipantId {
        match self {
            Target::Assign { participant, .. }
            | Target::Apply { participant, .. }
            | Target::Clear { participant, .. }
            | Target::Kick { participant } => *participant,
        }
    }
}

/// The changes one destination session must apply for one source operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyToken {
    /// Global sequence of the source operation.
    pub global_sequence: u64,
    /// Deduplicated snapshots, in the order they were added.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Targets, in the order they were added.
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl NotifyToken {
    /// Creates an empty notification stamped with `global_sequence`.
    pub fn new(global_sequence: u64) -> Self {
        Self {
            global_sequence,
            nodes: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Adds a snapshot taken at `dimension` and returns a reference to it.
    ///
    /// If the previously added node is at `dimension` or one of its
    /// ancestors, no snapshot is taken. The returned reference points at
    /// that node instead, qualified by the path below it.
    pub fn add_node(&mut self, dimension: &Dimension, snapshot: impl FnOnce() -> Value) -> NodeRef {
        if let Some(last) = self.nodes.last() {
            let index = self.nodes.len() - 1;
            match last.dimension.ancestry(dimension) {
                Some(Ancestry::Same) => return NodeRef { index, internal: None },
                Some(Ancestry::Ancestor(path)) => {
                    return NodeRef {
                        index,
                        internal: Some(path),
                    }
                }
                _ => {}
            }
        }
        self.nodes.push(Node {
            dimension: dimension.clone(),
            value: snapshot(),
        });
        NodeRef {
            index: self.nodes.len() - 1,
            internal: None,
        }
    }

    /// Appends a target.
    pub fn add_target(&mut self, target: Target) {
        self.targets.push(target);
    }

    /// Returns true if there is nothing to deliver.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Returns the value a node reference stands for.
    pub fn resolve(&self, node: &NodeRef) -> ProtocolResult<Value> {
        let entry = self.nodes.get(node.index).ok_or(ProtocolError::BadNodeIndex {
            index: node.index,
            len: self.nodes.len(),
        })?;
        Ok(match &node.internal {
            Some(path) => entry.value.snapshot(path),
            None => entry.value.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_tree::Datum;

    fn dim(text: &str) -> Dimension {
        text.parse().unwrap()
    }

    #[test]
    fn nested_nodes_are_deduplicated() {
        let tree = Value::empty().with_child("a", Value::empty().with_child("b", Value::leaf(1)));
        let mut notify = NotifyToken::new(5);

        let first = notify.add_node(&dim("a"), || tree.snapshot(&dim("a")));
        let second = notify.add_node(&dim("a:b"), || panic!("must reuse the previous node"));
        notify.add_target(Target::Assign {
            participant: 1,
            node: first.clone(),
            dimension: None,
        });
        notify.add_target(Target::Assign {
            participant: 2,
            node: second.clone(),
            dimension: None,
        });

        assert_eq!(notify.nodes.len(), 1);
        assert_eq!(second.index, 0);
        assert_eq!(second.internal, Some(dim("b")));
        assert_eq!(notify.resolve(&second).unwrap().data(), Some(&Datum::Integer(1)));
        assert_eq!(notify.targets.len(), 2);
    }

    #[test]
    fn same_node_reused_without_path() {
        let mut notify = NotifyToken::new(1);
        notify.add_node(&dim("x"), Value::empty);
        let again = notify.add_node(&dim("x"), Value::empty);
        assert_eq!(again, NodeRef { index: 0, internal: None });
    }

    #[test]
    fn unrelated_or_shallower_nodes_are_new() {
        let mut notify = NotifyToken::new(1);
        notify.add_node(&dim("a:b"), Value::empty);
        let sibling = notify.add_node(&dim("c"), Value::empty);
        let shallower = notify.add_node(&Dimension::root(), Value::empty);
        assert_eq!(sibling.index, 1);
        assert_eq!(shallower.index, 2);
        assert_eq!(notify.nodes.len(), 3);
    }

    #[test]
    fn bad_index_is_an_error() {
        let notify = NotifyToken::new(1);
        let err = notify
            .resolve(&NodeRef {
                index: 3,
                internal: None,
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::BadNodeIndex { index: 3, len: 0 }));
    }
}
