//! Visibility rules derived from collapse/hide flags on a node's ancestry.
//!
//! Collapse always hides descendants. Hide removes a node and its subtree
//! from normal view, but edit mode surfaces them again as dimmed so an
//! author can review and unhide them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::NodeId;
use crate::store::TreeStore;

/// How a node should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    /// Hidden outside edit mode, shown faded while editing.
    Dimmed,
    Hidden,
}

impl Visibility {
    pub fn is_rendered(self) -> bool {
        !matches!(self, Visibility::Hidden)
    }
}

/// Classify one node by walking its ancestor chain. O(depth).
///
/// Unknown ids classify as hidden.
pub fn classify(store: &TreeStore, id: NodeId, edit_mode: bool) -> Visibility {
    let Some(node) = store.get(id) else {
        return Visibility::Hidden;
    };
    let ancestors = store.ancestors_of(id);
    if ancestors.iter().any(|a| a.is_collapsed) {
        return Visibility::Hidden;
    }
    let hidden = node.is_hidden || ancestors.iter().any(|a| a.is_hidden);
    fold(hidden, edit_mode)
}

/// Boolean form of [`classify`].
pub fn is_visible(store: &TreeStore, id: NodeId, edit_mode: bool) -> bool {
    classify(store, id, edit_mode).is_rendered()
}

fn fold(hidden: bool, edit_mode: bool) -> Visibility {
    match (hidden, edit_mode) {
        (false, _) => Visibility::Visible,
        (true, true) => Visibility::Dimmed,
        (true, false) => Visibility::Hidden,
    }
}

/// Whole-tree classification computed top-down in one pass.
///
/// Remembers the store revision and edit mode it was built for so callers
/// can reuse it across frames until either changes.
#[derive(Debug, Clone, Default)]
pub struct VisibilityMap {
    entries: HashMap<NodeId, Visibility>,
    revision: u64,
    edit_mode: bool,
}

#[derive(Clone, Copy)]
struct Inherited {
    collapsed_above: bool,
    hidden_above: bool,
}

impl VisibilityMap {
    pub fn compute(store: &TreeStore, edit_mode: bool) -> Self {
        let mut entries = HashMap::with_capacity(store.len());
        let mut stack: Vec<(NodeId, Inherited)> = store
            .roots()
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    Inherited {
                        collapsed_above: false,
                        hidden_above: false,
                    },
                )
            })
            .collect();

        while let Some((id, inherited)) = stack.pop() {
            let Some(node) = store.get(id) else {
                continue;
            };
            let vis = if inherited.collapsed_above {
                Visibility::Hidden
            } else {
                fold(inherited.hidden_above || node.is_hidden, edit_mode)
            };
            if entries.insert(id, vis).is_some() {
                continue;
            }
            let below = Inherited {
                collapsed_above: inherited.collapsed_above || node.is_collapsed,
                hidden_above: inherited.hidden_above || node.is_hidden,
            };
            for child in store.children_of(id) {
                stack.push((child.id, below));
            }
        }

        Self {
            entries,
            revision: store.revision(),
            edit_mode,
        }
    }

    pub fn get(&self, id: NodeId) -> Visibility {
        self.entries.get(&id).copied().unwrap_or(Visibility::Hidden)
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.get(id).is_rendered()
    }

    /// Whether this map still describes `store` under `edit_mode`.
    pub fn is_current(&self, store: &TreeStore, edit_mode: bool) -> bool {
        self.revision == store.revision() && self.edit_mode == edit_mode
    }

    /// Ids of all rendered nodes.
    pub fn visible_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_rendered())
            .map(|(id, _)| *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::model::{Node, NodeUpdate};

    /// root -> a -> b -> c
    fn chain() -> (TreeStore, [NodeId; 4]) {
        let mut store = TreeStore::new();
        let root_id = store.allocate_node_id();
        store
            .insert(Node::root(root_id, "root", "", Position::ORIGIN))
            .unwrap();
        let mut ids = [root_id; 4];
        let mut parent = store.get(root_id).unwrap().clone();
        for (i, label) in ["a", "b", "c"].iter().enumerate() {
            let child = Node::child_of(&parent, store.allocate_node_id(), *label, "", Position::ORIGIN);
            ids[i + 1] = child.id;
            store.attach_children(vec![child.clone()]).unwrap();
            parent = child;
        }
        (store, ids)
    }

    #[test]
    fn collapsed_ancestor_hides_descendants_in_any_mode() {
        let (mut store, [_, a, b, c]) = chain();
        store.update(a, &NodeUpdate::new().collapsed(true));
        for edit in [false, true] {
            assert!(is_visible(&store, a, edit));
            assert!(!is_visible(&store, b, edit));
            assert!(!is_visible(&store, c, edit));
        }
        store.update(b, &NodeUpdate::new().hidden(false).collapsed(false));
        assert!(!is_visible(&store, c, false));
    }

    #[test]
    fn hidden_is_dimmed_in_edit_mode() {
        let (mut store, [_, a, b, c]) = chain();
        store.update(b, &NodeUpdate::new().hidden(true));
        assert_eq!(classify(&store, a, false), Visibility::Visible);
        assert_eq!(classify(&store, b, false), Visibility::Hidden);
        assert_eq!(classify(&store, c, false), Visibility::Hidden);
        assert_eq!(classify(&store, b, true), Visibility::Dimmed);
        assert_eq!(classify(&store, c, true), Visibility::Dimmed);
    }

    #[test]
    fn orphan_classifies_as_root() {
        let (mut store, [_, a, b, c]) = chain();
        store.update(a, &NodeUpdate::new().collapsed(true));
        store.remove(a);
        assert!(is_visible(&store, b, false));
        assert!(is_visible(&store, c, false));
    }

    #[test]
    fn map_agrees_with_per_node_classification() {
        let (mut store, ids) = chain();
        store.update(ids[1], &NodeUpdate::new().hidden(true));
        store.update(ids[2], &NodeUpdate::new().collapsed(true));
        for edit in [false, true] {
            let map = VisibilityMap::compute(&store, edit);
            assert!(map.is_current(&store, edit));
            for id in ids {
                assert_eq!(map.get(id), classify(&store, id, edit), "{id} edit={edit}");
            }
        }
        let map = VisibilityMap::compute(&store, false);
        store.update(ids[2], &NodeUpdate::new().collapsed(false));
        assert!(!map.is_current(&store, false));
    }

    #[test]
    fn map_covers_nodes_inserted_without_an_edge() {
        let (mut store, ids) = chain();
        let c = store.get(ids[3]).unwrap().clone();
        let d = Node::child_of(&c, store.allocate_node_id(), "d", "", Position::ORIGIN);
        let d_id = d.id;
        store.insert(d).unwrap();

        let map = VisibilityMap::compute(&store, false);
        assert_eq!(classify(&store, d_id, false), Visibility::Visible);
        assert_eq!(map.get(d_id), Visibility::Visible);

        store.update(ids[1], &NodeUpdate::new().collapsed(true));
        let map = VisibilityMap::compute(&store, false);
        assert_eq!(map.get(d_id), classify(&store, d_id, false));
        assert_eq!(map.get(d_id), Visibility::Hidden);
    }
}
