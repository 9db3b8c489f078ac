//! Read-only projections of the engine state for renderers and the minimap.

use serde::{Deserialize, Serialize};
use thought_canvas_core::{EdgeId, Node, NodeId, Position, Rect, TreeStore, Visibility, VisibilityMap};
use thought_canvas_layout::LayoutState;

use crate::viewport::{Camera, Viewport};

/// A node that should be drawn this frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibleNode {
    #[serde(flatten)]
    pub node: Node,
    /// Position after the camera transform.
    pub screen: Position,
    /// Hidden node surfaced by edit mode.
    pub dimmed: bool,
    pub selected: bool,
}

/// An edge that should be drawn this frame, with resolved endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisibleEdge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub from_position: Position,
    pub to_position: Position,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSet {
    pub nodes: Vec<VisibleNode>,
    pub edges: Vec<VisibleEdge>,
    pub camera: Camera,
    /// World-space rectangle nodes were culled against.
    pub bounds: Rect,
}

impl RenderSet {
    /// Nodes within the viewport plus `margin` that pass the visibility
    /// rules. Edges are kept when both endpoints pass the visibility rules
    /// and at least one lies inside the bounds.
    pub fn compute(
        store: &TreeStore,
        visibility: &VisibilityMap,
        viewport: &Viewport,
        margin: f32,
        selected: Option<NodeId>,
    ) -> Self {
        let bounds = viewport.world_rect().expand(margin);

        let nodes = store
            .nodes()
            .filter_map(|node| {
                let vis = visibility.get(node.id);
                if !vis.is_rendered() || !bounds.contains(node.position) {
                    return None;
                }
                Some(VisibleNode {
                    screen: viewport.world_to_screen(node.position),
                    dimmed: vis == Visibility::Dimmed,
                    selected: selected == Some(node.id),
                    node: node.clone(),
                })
            })
            .collect();

        let edges = store
            .edges()
            .into_iter()
            .filter_map(|edge| {
                let from = store.get(edge.from)?;
                let to = store.get(edge.to)?;
                // Both ends must be drawn; one end on screen is enough.
                if !visibility.is_visible(from.id) || !visibility.is_visible(to.id) {
                    return None;
                }
                if !bounds.contains(from.position) && !bounds.contains(to.position) {
                    return None;
                }
                Some(VisibleEdge {
                    id: edge.id,
                    from: edge.from,
                    to: edge.to,
                    from_position: from.position,
                    to_position: to.position,
                })
            })
            .collect();

        Self {
            nodes,
            edges,
            camera: viewport.camera(),
            bounds,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&VisibleNode> {
        self.nodes.iter().find(|n| n.node.id == id)
    }
}

/// One node on the minimap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimapDot {
    pub id: NodeId,
    pub position: Position,
    pub level: u32,
    pub dimmed: bool,
}

/// The whole visible tree squeezed into a fixed-size overview box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimapProjection {
    /// `minimap_size / canvas_size`.
    pub scale: f32,
    pub size: f32,
    pub dots: Vec<MinimapDot>,
    /// The camera's world rectangle in minimap coordinates.
    pub viewport: Rect,
}

impl MinimapProjection {
    pub fn compute(
        store: &TreeStore,
        visibility: &VisibilityMap,
        viewport: &Viewport,
        canvas_size: f32,
        minimap_size: f32,
    ) -> Self {
        let scale = minimap_size / canvas_size;
        let dots = store
            .nodes()
            .filter_map(|node| {
                let vis = visibility.get(node.id);
                vis.is_rendered().then(|| MinimapDot {
                    id: node.id,
                    position: Position::new(node.position.x * scale, node.position.y * scale),
                    level: node.level,
                    dimmed: vis == Visibility::Dimmed,
                })
            })
            .collect();
        Self {
            scale,
            size: minimap_size,
            dots,
            viewport: viewport.world_rect().scale(scale),
        }
    }

    /// World point for a click at `(x, y)` inside the minimap.
    pub fn to_world(&self, x: f32, y: f32) -> Position {
        Position::new(x / self.scale, y / self.scale)
    }
}

/// Snapshot published to subscribers after every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Store revision the frame was built from.
    pub revision: u64,
    pub node_count: usize,
    pub edge_count: usize,
    pub layout_state: LayoutState,
    pub edit_mode: bool,
    pub render: RenderSet,
    pub minimap: MinimapProjection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewportConfig;
    use thought_canvas_core::NodeUpdate;

    fn store() -> (TreeStore, Vec<NodeId>) {
        let mut store = TreeStore::new();
        let root = store.allocate_node_id();
        store
            .insert(Node::root(root, "root", "", Position::new(500.0, 100.0)))
            .unwrap();
        let parent = store.get(root).unwrap().clone();
        let kids: Vec<Node> = [(300.0, 280.0), (700.0, 280.0), (4000.0, 280.0)]
            .iter()
            .enumerate()
            .map(|(i, (x, y))| {
                Node::child_of(
                    &parent,
                    store.allocate_node_id(),
                    format!("k{i}"),
                    "",
                    Position::new(*x, *y),
                )
            })
            .collect();
        let mut ids = vec![root];
        ids.extend(kids.iter().map(|k| k.id));
        store.attach_children(kids).unwrap();
        (store, ids)
    }

    #[test]
    fn culls_nodes_outside_the_expanded_viewport() {
        let (store, ids) = store();
        let vis = VisibilityMap::compute(&store, false);
        let vp = Viewport::new(&ViewportConfig::default());
        let set = RenderSet::compute(&store, &vis, &vp, 100.0, Some(ids[1]));

        let drawn: Vec<NodeId> = set.nodes.iter().map(|n| n.node.id).collect();
        assert_eq!(drawn, vec![ids[0], ids[1], ids[2]]);
        assert!(set.node(ids[1]).unwrap().selected);
        // The off-screen child's edge survives because the root is in bounds.
        assert_eq!(set.edges.len(), 3);
        let far = set.edges.iter().find(|e| e.to == ids[3]).unwrap();
        assert_eq!(far.to_position, Position::new(4000.0, 280.0));
    }

    #[test]
    fn hidden_nodes_drop_out_and_return_dimmed_in_edit_mode() {
        let (mut store, ids) = store();
        store.update(ids[1], &NodeUpdate::new().hidden(true));
        let vp = Viewport::new(&ViewportConfig::default());

        let normal = RenderSet::compute(&store, &VisibilityMap::compute(&store, false), &vp, 0.0, None);
        assert!(normal.node(ids[1]).is_none());
        assert!(normal.edges.iter().all(|e| e.to != ids[1]));

        let editing = RenderSet::compute(&store, &VisibilityMap::compute(&store, true), &vp, 0.0, None);
        assert!(editing.node(ids[1]).unwrap().dimmed);
    }

    #[test]
    fn minimap_scales_uniformly() {
        let (store, ids) = store();
        let vis = VisibilityMap::compute(&store, false);
        let mut vp = Viewport::new(&ViewportConfig::default());
        vp.zoom_at(0.5, Position::ORIGIN);
        let map = MinimapProjection::compute(&store, &vis, &vp, 5000.0, 200.0);
        assert_eq!(map.scale, 0.04);
        assert_eq!(map.dots.len(), 4);
        let far = map.dots.iter().find(|d| d.id == ids[3]).unwrap();
        assert!((far.position.x - 160.0).abs() < 1e-3);
        assert!((map.viewport.width() - 2560.0 * 0.04).abs() < 1e-3);
        let back = map.to_world(far.position.x, far.position.y);
        assert!(back.distance(Position::new(4000.0, 280.0)) < 1e-2);
    }
}
