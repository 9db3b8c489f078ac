//! Error types for the tree store.

use thiserror::Error;

use crate::model::{EdgeId, NodeId};

/// Contract violations rejected by [`TreeStore`](crate::TreeStore).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("node {0} already exists")]
    DuplicateNode(NodeId),

    #[error("parent {parent} of node {child} is not in the store")]
    UnknownParent { child: NodeId, parent: NodeId },

    #[error("node {node} has level {actual}, expected {expected}")]
    LevelMismatch {
        node: NodeId,
        expected: u32,
        actual: u32,
    },

    #[error("node {0} path does not extend its parent's path with its own label")]
    PathMismatch(NodeId),

    #[error("edge {from} -> {to} references a node that is not in the store")]
    DanglingEdge { from: NodeId, to: NodeId },

    #[error("edge {0} already exists")]
    DuplicateEdge(EdgeId),

    #[error("edge {edge} from {from} to {to} does not follow the child's parent link")]
    EdgeMismatch {
        edge: EdgeId,
        from: NodeId,
        to: NodeId,
    },

    #[error("node {0} already has a parent edge")]
    ParentEdgeExists(NodeId),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
