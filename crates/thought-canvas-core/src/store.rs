//! Authoritative node/edge storage backed by a petgraph `StableDiGraph`.
//!
//! The graph gives stable indices across removals, and the id maps give
//! O(log n) lookups so that ancestor and subtree walks never scan the whole
//! node set. Structure follows `parent_id` through a child index; edges are
//! the renderable record of those links.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::Direction;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::geometry::Position;
use crate::model::{Edge, EdgeId, Node, NodeId, NodeUpdate};

/// The node/edge forest.
///
/// Cloning is the intended way to derive a new snapshot: callers clone,
/// mutate the clone and publish it.
#[derive(Debug, Clone, Default)]
pub struct TreeStore {
    graph: StableDiGraph<Node, Edge>,
    node_index: BTreeMap<NodeId, NodeIndex>,
    edge_index: HashMap<EdgeId, EdgeIndex>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    next_node: u64,
    next_edge: u64,
    revision: u64,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Id allocation
    // =========================================================================

    /// Reserve a fresh node id.
    pub fn allocate_node_id(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    /// Reserve a fresh edge id.
    pub fn allocate_edge_id(&mut self) -> EdgeId {
        self.next_edge += 1;
        EdgeId(self.next_edge)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a single node after checking the structural invariants.
    ///
    /// Does not create the parent edge; use [`TreeStore::insert_edge`] or
    /// [`TreeStore::attach_children`] for that.
    pub fn insert(&mut self, node: Node) -> StoreResult<()> {
        self.validate(&node, &HashMap::new())?;
        self.insert_unchecked(node);
        self.revision += 1;
        Ok(())
    }

    /// Insert the parent edge of an already stored node.
    ///
    /// `edge.to` must name `edge.from` as its parent and must not have a
    /// parent edge yet; the edge id must be unused.
    pub fn insert_edge(&mut self, edge: Edge) -> StoreResult<()> {
        let from = self.node_index.get(&edge.from).copied();
        let to = self.node_index.get(&edge.to).copied();
        let (Some(from), Some(to)) = (from, to) else {
            return Err(StoreError::DanglingEdge {
                from: edge.from,
                to: edge.to,
            });
        };
        if self.edge_index.contains_key(&edge.id) {
            return Err(StoreError::DuplicateEdge(edge.id));
        }
        if self.get(edge.to).and_then(|n| n.parent_id) != Some(edge.from) {
            return Err(StoreError::EdgeMismatch {
                edge: edge.id,
                from: edge.from,
                to: edge.to,
            });
        }
        if self
            .graph
            .edges_directed(to, Direction::Incoming)
            .next()
            .is_some()
        {
            return Err(StoreError::ParentEdgeExists(edge.to));
        }
        self.bump_edge_counter(edge.id);
        let idx = self.graph.add_edge(from, to, edge);
        self.edge_index.insert(edge.id, idx);
        self.revision += 1;
        Ok(())
    }

    /// Insert a batch of children together with their parent edges.
    ///
    /// Every node is validated before anything is written, so the store
    /// either gains the whole batch or is left untouched. A node's parent may
    /// be an existing node or an earlier member of the same batch.
    pub fn attach_children(&mut self, children: Vec<Node>) -> StoreResult<Vec<EdgeId>> {
        let mut pending: HashMap<NodeId, &Node> = HashMap::new();
        for child in &children {
            self.validate(child, &pending)?;
            pending.insert(child.id, child);
        }

        let mut edge_ids = Vec::with_capacity(children.len());
        for child in children {
            let from = child.parent_id;
            let to = child.id;
            self.insert_unchecked(child);
            if let Some(from) = from {
                let id = self.allocate_edge_id();
                // Both endpoints were validated above.
                let a = self.node_index.get(&from).copied();
                let b = self.node_index.get(&to).copied();
                if let (Some(a), Some(b)) = (a, b) {
                    let idx = self.graph.add_edge(a, b, Edge { id, from, to });
                    self.edge_index.insert(id, idx);
                    edge_ids.push(id);
                }
            }
        }
        self.revision += 1;
        debug!(nodes = edge_ids.len(), "store_batch_attached");
        Ok(edge_ids)
    }

    /// Remove a node and every edge touching it. Descendants are kept and
    /// become orphans whose `parent_id` no longer resolves.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let idx = self.node_index.remove(&id)?;
        let incident: Vec<EdgeId> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.graph.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().id)
            .collect();
        for edge_id in &incident {
            self.edge_index.remove(edge_id);
        }
        let node = self.graph.remove_node(idx)?;
        if let Some(siblings) = node.parent_id.and_then(|pid| self.children.get_mut(&pid)) {
            siblings.remove(&id);
        }
        self.children.remove(&id);
        self.revision += 1;
        debug!(node = %id, edges = incident.len(), "store_node_removed");
        Some(node)
    }

    /// Apply a partial update. Unknown ids are ignored; returns whether a
    /// node was touched.
    pub fn update(&mut self, id: NodeId, update: &NodeUpdate) -> bool {
        let Some(&idx) = self.node_index.get(&id) else {
            return false;
        };
        let Some(node) = self.graph.node_weight_mut(idx) else {
            return false;
        };
        node.apply(update);
        if !update.is_position_only() {
            self.revision += 1;
        }
        true
    }

    /// Overwrite positions for a set of nodes. Unknown ids are skipped and the
    /// topology revision is left alone.
    pub fn set_positions<I>(&mut self, positions: I)
    where
        I: IntoIterator<Item = (NodeId, Position)>,
    {
        for (id, pos) in positions {
            if let Some(&idx) = self.node_index.get(&id) {
                if let Some(node) = self.graph.node_weight_mut(idx) {
                    node.position = pos;
                }
            }
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.node_index
            .get(&id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.get(id).map(|n| n.position)
    }

    pub fn len(&self) -> usize {
        self.node_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_index.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_index.len()
    }

    /// Counter bumped by every structural or flag change. Position-only
    /// writes leave it untouched so per-tick layout does not invalidate
    /// derived visibility.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// All nodes in id order, which is also creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.node_index
            .values()
            .filter_map(|&idx| self.graph.node_weight(idx))
    }

    /// All edges in id order.
    pub fn edges(&self) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.graph.edge_weights().collect();
        edges.sort_by_key(|e| e.id);
        edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edge_index
            .get(&id)
            .and_then(|&idx| self.graph.edge_weight(idx))
    }

    /// Direct children in creation order, whether or not their parent edge
    /// has been inserted yet.
    pub fn children_of(&self, id: NodeId) -> Vec<&Node> {
        if !self.contains(id) {
            return Vec::new();
        }
        self.children
            .get(&id)
            .map(|kids| kids.iter().filter_map(|&c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// Ancestors from the direct parent up to the root.
    ///
    /// The walk stops at the first `parent_id` that does not resolve, so an
    /// orphan behaves as a root. It is also bounded by the node count.
    pub fn ancestors_of(&self, id: NodeId) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|n| n.parent_id);
        while let Some(pid) = current {
            let Some(parent) = self.get(pid) else {
                break;
            };
            out.push(parent);
            if out.len() > self.len() {
                break;
            }
            current = parent.parent_id;
        }
        out
    }

    /// All transitive descendants, breadth first. Does not include `id`.
    pub fn descendants_of(&self, id: NodeId) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::from([id]);
        seen.insert(id);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if seen.insert(child.id) {
                    out.push(child);
                    queue.push_back(child.id);
                }
            }
        }
        out
    }

    /// Whether `id` has a recorded parent that is no longer in the store.
    pub fn is_orphan(&self, id: NodeId) -> bool {
        self.get(id)
            .and_then(|n| n.parent_id)
            .is_some_and(|pid| !self.contains(pid))
    }

    /// True roots plus orphans, which act as roots for layout.
    pub fn roots(&self) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.parent_id.map_or(true, |pid| !self.contains(pid)))
            .collect()
    }

    pub fn max_level(&self) -> u32 {
        self.nodes().map(|n| n.level).max().unwrap_or(0)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn validate(&self, node: &Node, pending: &HashMap<NodeId, &Node>) -> StoreResult<()> {
        if self.contains(node.id) || pending.contains_key(&node.id) {
            return Err(StoreError::DuplicateNode(node.id));
        }
        match node.parent_id {
            None => {
                if node.level != 0 {
                    return Err(StoreError::LevelMismatch {
                        node: node.id,
                        expected: 0,
                        actual: node.level,
                    });
                }
                if node.path.len() != 1 || node.path[0] != node.label {
                    return Err(StoreError::PathMismatch(node.id));
                }
            }
            Some(pid) => {
                let parent = self
                    .get(pid)
                    .or_else(|| pending.get(&pid).copied())
                    .ok_or(StoreError::UnknownParent {
                        child: node.id,
                        parent: pid,
                    })?;
                if node.level != parent.level + 1 {
                    return Err(StoreError::LevelMismatch {
                        node: node.id,
                        expected: parent.level + 1,
                        actual: node.level,
                    });
                }
                let extends = node.path.len() == parent.path.len() + 1
                    && node.path[..parent.path.len()] == parent.path[..]
                    && node.path.last() == Some(&node.label);
                if !extends {
                    return Err(StoreError::PathMismatch(node.id));
                }
            }
        }
        Ok(())
    }

    fn insert_unchecked(&mut self, node: Node) {
        self.next_node = self.next_node.max(node.id.0);
        let id = node.id;
        if let Some(pid) = node.parent_id {
            self.children.entry(pid).or_default().insert(id);
        }
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
    }

    fn bump_edge_counter(&mut self, id: EdgeId) {
        self.next_edge = self.next_edge.max(id.0);
    }
}
