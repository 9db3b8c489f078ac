//! Node and edge records held by the [`TreeStore`](crate::TreeStore).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Position;

/// Identifier for nodes within a tree. Allocated monotonically by the store
/// and never reused, so a stale id can never alias a newer node.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeId(pub u64);

/// Identifier for parent → child edges.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// A reference attached to a node's insight (title + link).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// A single concept on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: NodeId,
    /// Short display text.
    pub label: String,
    /// Long-form text. Holds a placeholder while the first response is pending.
    pub description: String,
    /// `None` only for roots.
    pub parent_id: Option<NodeId>,
    /// Depth in the tree, 0 at roots.
    pub level: u32,
    /// World-space position.
    pub position: Position,
    /// Children have been requested at least once.
    pub is_expanded: bool,
    /// A service request for this node is in flight.
    pub is_loading: bool,
    /// Descendants are hidden from view but retained.
    pub is_collapsed: bool,
    /// The node itself is hidden outside edit mode.
    pub is_hidden: bool,
    /// Cosmetic highlight for freshly attached nodes.
    pub is_new: bool,
    /// Labels from the tree's root down to and including this node.
    pub path: Vec<String>,
    /// References returned with the node's insight.
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Message of the most recent failed request, cleared on the next success.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Node {
    /// Build a root node in its loading state.
    pub fn root(
        id: NodeId,
        label: impl Into<String>,
        placeholder: impl Into<String>,
        position: Position,
    ) -> Self {
        let label = label.into();
        Self {
            id,
            path: vec![label.clone()],
            label,
            description: placeholder.into(),
            parent_id: None,
            level: 0,
            position,
            is_expanded: false,
            is_loading: true,
            is_collapsed: false,
            is_hidden: false,
            is_new: false,
            sources: Vec::new(),
            last_error: None,
        }
    }

    /// Build a child of `parent`, deriving `level` and `path` from it.
    pub fn child_of(
        parent: &Node,
        id: NodeId,
        label: impl Into<String>,
        description: impl Into<String>,
        position: Position,
    ) -> Self {
        let label = label.into();
        let mut path = parent.path.clone();
        path.push(label.clone());
        Self {
            id,
            label,
            description: description.into(),
            parent_id: Some(parent.id),
            level: parent.level + 1,
            position,
            is_expanded: false,
            is_loading: false,
            is_collapsed: false,
            is_hidden: false,
            is_new: true,
            path,
            sources: Vec::new(),
            last_error: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &NodeUpdate) {
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        if let Some(position) = update.position {
            self.position = position;
        }
        if let Some(v) = update.is_expanded {
            self.is_expanded = v;
        }
        if let Some(v) = update.is_loading {
            self.is_loading = v;
        }
        if let Some(v) = update.is_collapsed {
            self.is_collapsed = v;
        }
        if let Some(v) = update.is_hidden {
            self.is_hidden = v;
        }
        if let Some(v) = update.is_new {
            self.is_new = v;
        }
        if let Some(sources) = &update.sources {
            self.sources = sources.clone();
        }
        if let Some(err) = &update.last_error {
            self.last_error = err.clone();
        }
    }
}

/// Parent → child link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
}

/// Partial field update for [`TreeStore::update`](crate::TreeStore::update).
///
/// Structural fields (label, parent, level, path) are fixed at creation and
/// cannot be patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub description: Option<String>,
    pub position: Option<Position>,
    pub is_expanded: Option<bool>,
    pub is_loading: Option<bool>,
    pub is_collapsed: Option<bool>,
    pub is_hidden: Option<bool>,
    pub is_new: Option<bool>,
    pub sources: Option<Vec<Source>>,
    /// `Some(None)` clears the recorded error.
    pub last_error: Option<Option<String>>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn expanded(mut self, v: bool) -> Self {
        self.is_expanded = Some(v);
        self
    }

    pub fn loading(mut self, v: bool) -> Self {
        self.is_loading = Some(v);
        self
    }

    pub fn collapsed(mut self, v: bool) -> Self {
        self.is_collapsed = Some(v);
        self
    }

    pub fn hidden(mut self, v: bool) -> Self {
        self.is_hidden = Some(v);
        self
    }

    pub fn new_flag(mut self, v: bool) -> Self {
        self.is_new = Some(v);
        self
    }

    pub fn sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn last_error(mut self, err: Option<String>) -> Self {
        self.last_error = Some(err);
        self
    }

    /// True when the update only moves the node.
    pub fn is_position_only(&self) -> bool {
        self.position.is_some()
            && self.description.is_none()
            && self.is_expanded.is_none()
            && self.is_loading.is_none()
            && self.is_collapsed.is_none()
            && self.is_hidden.is_none()
            && self.is_new.is_none()
            && self.sources.is_none()
            && self.last_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_derives_level_and_path() {
        let root = Node::root(NodeId(1), "Rust", "Loading...", Position::ORIGIN);
        let child = Node::child_of(&root, NodeId(2), "Ownership", "", Position::new(0.0, 180.0));
        assert_eq!(child.level, 1);
        assert_eq!(child.parent_id, Some(NodeId(1)));
        assert_eq!(child.path, vec!["Rust".to_string(), "Ownership".to_string()]);
        assert!(child.is_new);
        assert!(root.is_loading);
    }

    #[test]
    fn apply_patches_only_given_fields() {
        let mut node = Node::root(NodeId(1), "Rust", "Loading...", Position::ORIGIN);
        node.apply(&NodeUpdate::new().loading(false).last_error(Some("boom".into())));
        assert!(!node.is_loading);
        assert_eq!(node.description, "Loading...");
        assert_eq!(node.last_error.as_deref(), Some("boom"));

        node.apply(&NodeUpdate::new().last_error(None));
        assert!(node.last_error.is_none());
    }

    #[test]
    fn node_serializes_with_snake_case_fields() {
        let node = Node::root(NodeId(7), "Rust", "Loading...", Position::ORIGIN);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["parent_id"], serde_json::Value::Null);
        assert_eq!(json["id"], 7);
    }
}
