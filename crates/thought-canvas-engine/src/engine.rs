//! Composition root: owns the tree snapshot, the active layout strategy and
//! the camera, and applies every mutation as a copy-on-write update.
//!
//! Slow work (the topic service) is split into a `begin_*` call that marks
//! the node loading and returns a request, and a `complete_*` call that
//! applies the response. Anything can happen in between; completions check
//! the current snapshot before writing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thought_canvas_core::{Node, NodeId, NodeUpdate, Position, StoreError, TreeStore, VisibilityMap};
use thought_canvas_layout::{
    build_strategy, place_children, root_position, LayoutInput, LayoutState, LayoutStrategy,
    Positions,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ServiceError};
use crate::render::{Frame, MinimapProjection, RenderSet};
use crate::service::{Insight, TopicSuggestion};
use crate::viewport::Viewport;

/// Parameters for one call to the topic service's `request_children`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionRequest {
    pub node: NodeId,
    pub parent_label: String,
    pub desired_count: usize,
    /// Labels from the root down to and including the parent.
    pub ancestor_path: Vec<String>,
    /// Labels of the parent's current children.
    pub excluded: Vec<String>,
}

/// Parameters for one call to the topic service's `request_insight`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightRequest {
    pub node: NodeId,
    pub label: String,
}

/// What happened to an expansion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionOutcome {
    /// Children were attached (possibly none, if all were duplicates).
    Attached(Vec<NodeId>),
    /// The node was pruned while the request was in flight.
    Discarded,
    /// The service failed; the node shows the error.
    Failed(String),
}

/// What happened to an insight response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightOutcome {
    Applied,
    Discarded,
    Failed(String),
}

/// Single-writer owner of the exploration state.
#[derive(Debug)]
pub struct LayoutEngine {
    config: EngineConfig,
    store: Arc<TreeStore>,
    strategy: Box<dyn LayoutStrategy>,
    viewport: Viewport,
    visibility: VisibilityMap,
    edit_mode: bool,
    selected: Option<NodeId>,
    dragging: Option<NodeId>,
    /// Seconds of session time, advanced by `tick`.
    clock: f64,
    new_until: HashMap<NodeId, f64>,
}

impl LayoutEngine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let strategy = build_strategy(config.layout, config.resolver, config.force_config())?;
        let viewport = Viewport::new(&config.viewport);
        let store = Arc::new(TreeStore::new());
        let visibility = VisibilityMap::compute(&store, false);
        info!(layout = %config.layout, "layout_engine_created");
        Ok(Self {
            config,
            store,
            strategy,
            viewport,
            visibility,
            edit_mode: false,
            selected: None,
            dragging: None,
            clock: 0.0,
            new_until: HashMap::new(),
        })
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current immutable snapshot. Later mutations never affect it.
    pub fn snapshot(&self) -> Arc<TreeStore> {
        Arc::clone(&self.store)
    }

    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.store.get(id)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Camera control: zoom, pan, center and animated moves.
    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn visibility(&self) -> &VisibilityMap {
        &self.visibility
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn dragging(&self) -> Option<NodeId> {
        self.dragging
    }

    pub fn layout_state(&self) -> LayoutState {
        self.strategy.state()
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    // =========================================================================
    // Exploration lifecycle
    // =========================================================================

    /// Create a root for `topic` in its loading state and center the camera
    /// on it. The returned request enriches it.
    pub fn start_exploration(&mut self, topic: &str) -> EngineResult<InsightRequest> {
        let label = topic.trim();
        if label.is_empty() {
            return Err(EngineError::EmptyTopic);
        }
        let position = root_position(self.config.canvas_size);
        let placeholder = self.config.expansion.loading_placeholder.clone();
        let id = self.commit(|store| {
            let id = store.allocate_node_id();
            store
                .insert(Node::root(id, label, placeholder, position))
                .map(|()| id)
        })?;
        self.viewport.center_on(position);
        self.relayout();
        info!(node = %id, topic = label, "exploration_started");
        Ok(InsightRequest {
            node: id,
            label: label.to_string(),
        })
    }

    /// Mark `id` loading and describe the children request to send.
    ///
    /// Returns `Ok(None)` when a request for the node is already in flight.
    pub fn begin_expansion(&mut self, id: NodeId) -> EngineResult<Option<ExpansionRequest>> {
        let node = self.store.get(id).ok_or(EngineError::NodeNotFound(id))?;
        if node.is_loading {
            debug!(node = %id, "expansion_skipped_in_flight");
            return Ok(None);
        }
        let request = ExpansionRequest {
            node: id,
            parent_label: node.label.clone(),
            desired_count: self.config.expansion.desired_children,
            ancestor_path: node.path.clone(),
            excluded: self
                .store
                .children_of(id)
                .iter()
                .map(|c| c.label.clone())
                .collect(),
        };
        self.commit(|store| store.update(id, &NodeUpdate::new().loading(true)));
        debug!(node = %id, excluded = request.excluded.len(), "expansion_requested");
        Ok(Some(request))
    }

    /// Apply a children response.
    pub fn complete_expansion(
        &mut self,
        request: &ExpansionRequest,
        result: Result<Vec<TopicSuggestion>, ServiceError>,
    ) -> ExpansionOutcome {
        let id = request.node;
        let Some(parent) = self.store.get(id).cloned() else {
            warn!(node = %id, "expansion_response_discarded");
            return ExpansionOutcome::Discarded;
        };
        let suggestions = match result {
            Ok(s) => s,
            Err(err) => return ExpansionOutcome::Failed(self.record_failure(id, &err)),
        };

        let mut seen: HashSet<String> = self
            .store
            .children_of(id)
            .iter()
            .map(|c| c.label.to_lowercase())
            .collect();
        let fresh: Vec<TopicSuggestion> = suggestions
            .into_iter()
            .filter_map(|s| {
                let label = s.topic.trim().to_string();
                (!label.is_empty() && seen.insert(label.to_lowercase()))
                    .then(|| TopicSuggestion::new(label, s.description.trim()))
            })
            .take(request.desired_count)
            .collect();

        let existing: Vec<Position> = self
            .store
            .children_of(id)
            .iter()
            .map(|c| c.position)
            .collect();
        let slots = place_children(
            parent.position,
            &existing,
            fresh.len(),
            &self.config.placement,
        );

        let attached = self.commit(|store| {
            let children: Vec<Node> = fresh
                .iter()
                .zip(slots)
                .map(|(s, pos)| {
                    let child_id = store.allocate_node_id();
                    Node::child_of(&parent, child_id, s.topic.clone(), s.description.clone(), pos)
                })
                .collect();
            let ids: Vec<NodeId> = children.iter().map(|c| c.id).collect();
            store.attach_children(children)?;
            store.update(
                id,
                &NodeUpdate::new()
                    .expanded(true)
                    .collapsed(false)
                    .loading(false)
                    .last_error(None),
            );
            Ok::<_, StoreError>(ids)
        });

        match attached {
            Ok(ids) => {
                let until = self.clock + f64::from(self.config.expansion.new_flag_secs);
                for child in &ids {
                    self.new_until.insert(*child, until);
                }
                self.relayout();
                info!(node = %id, children = ids.len(), "expansion_attached");
                ExpansionOutcome::Attached(ids)
            }
            Err(err) => {
                let msg = self.record_failure(id, &err);
                ExpansionOutcome::Failed(msg)
            }
        }
    }

    /// Mark `id` loading and describe the insight request to send.
    ///
    /// Shares the in-flight slot with expansion.
    pub fn begin_insight(&mut self, id: NodeId) -> EngineResult<Option<InsightRequest>> {
        let node = self.store.get(id).ok_or(EngineError::NodeNotFound(id))?;
        if node.is_loading {
            debug!(node = %id, "insight_skipped_in_flight");
            return Ok(None);
        }
        let request = InsightRequest {
            node: id,
            label: node.label.clone(),
        };
        self.commit(|store| store.update(id, &NodeUpdate::new().loading(true)));
        Ok(Some(request))
    }

    /// Apply an insight response.
    pub fn complete_insight(
        &mut self,
        request: &InsightRequest,
        result: Result<Insight, ServiceError>,
    ) -> InsightOutcome {
        let id = request.node;
        if !self.store.contains(id) {
            warn!(node = %id, "insight_response_discarded");
            return InsightOutcome::Discarded;
        }
        match result {
            Ok(insight) => {
                self.commit(|store| {
                    store.update(
                        id,
                        &NodeUpdate::new()
                            .description(insight.description)
                            .sources(insight.sources)
                            .loading(false)
                            .last_error(None),
                    )
                });
                debug!(node = %id, "insight_applied");
                InsightOutcome::Applied
            }
            Err(err) => InsightOutcome::Failed(self.record_failure(id, &err)),
        }
    }

    /// Leave the loading state after a failed request and surface the error.
    fn record_failure(&mut self, id: NodeId, err: &dyn std::error::Error) -> String {
        let message = err.to_string();
        let placeholder = &self.config.expansion.loading_placeholder;
        let still_placeholder = self
            .store
            .get(id)
            .is_some_and(|n| &n.description == placeholder);
        let mut update = NodeUpdate::new()
            .loading(false)
            .last_error(Some(message.clone()));
        if still_placeholder {
            update = update.description(self.config.expansion.fallback_description.clone());
        }
        self.commit(|store| store.update(id, &update));
        warn!(node = %id, error = %message, "topic_request_failed");
        message
    }

    // =========================================================================
    // Structure and flags
    // =========================================================================

    /// Delete a node and its edges. Its descendants stay as orphans.
    pub fn prune(&mut self, id: NodeId) -> EngineResult<Node> {
        let removed = self
            .commit(|store| store.remove(id))
            .ok_or(EngineError::NodeNotFound(id))?;
        if self.selected == Some(id) {
            self.selected = None;
        }
        if self.dragging == Some(id) {
            self.dragging = None;
        }
        self.new_until.remove(&id);
        self.relayout();
        info!(node = %id, "node_pruned");
        Ok(removed)
    }

    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) -> EngineResult<()> {
        self.require(id)?;
        self.commit(|store| store.update(id, &NodeUpdate::new().collapsed(collapsed)));
        self.relayout();
        Ok(())
    }

    /// Flip the collapse flag and return the new value.
    pub fn toggle_collapse(&mut self, id: NodeId) -> EngineResult<bool> {
        let collapsed = !self.require(id)?.is_collapsed;
        self.set_collapsed(id, collapsed)?;
        Ok(collapsed)
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> EngineResult<()> {
        self.require(id)?;
        self.commit(|store| store.update(id, &NodeUpdate::new().hidden(hidden)));
        self.relayout();
        Ok(())
    }

    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        if self.edit_mode != edit_mode {
            self.edit_mode = edit_mode;
            self.relayout();
        }
    }

    /// Select a node (pinning it for the simulation) or clear the selection.
    pub fn select(&mut self, id: Option<NodeId>) -> EngineResult<()> {
        if let Some(id) = id {
            self.require(id)?;
        }
        self.selected = id;
        Ok(())
    }

    /// Start an animated camera move onto a node.
    pub fn focus(&mut self, id: NodeId) -> EngineResult<()> {
        let position = self.require(id)?.position;
        self.viewport.animate_to(position);
        Ok(())
    }

    // =========================================================================
    // Dragging
    // =========================================================================

    pub fn begin_drag(&mut self, id: NodeId) -> EngineResult<()> {
        self.require(id)?;
        self.dragging = Some(id);
        Ok(())
    }

    /// Move the dragged node to a world position.
    pub fn drag_to(&mut self, world: Position) {
        let Some(id) = self.dragging else {
            return;
        };
        if !world.is_finite() {
            return;
        }
        self.commit(|store| store.set_positions([(id, world)]));
        if self.strategy.is_continuous() {
            self.relayout();
        }
    }

    /// Move the dragged node to wherever a screen point maps.
    pub fn drag_to_screen(&mut self, screen: Position) {
        let world = self.viewport.screen_to_world(screen);
        self.drag_to(world);
    }

    /// Release the dragged node and let the layout react.
    pub fn end_drag(&mut self) {
        if self.dragging.take().is_some() {
            self.relayout();
        }
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// Advance session time by `dt` seconds: expire `is_new` flags, move the
    /// camera transition and step a continuous layout. Returns whether
    /// anything visible changed.
    pub fn tick(&mut self, dt: f32) -> bool {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += f64::from(dt);
        let mut changed = self.expire_new_flags();
        changed |= self.viewport.advance(dt);

        if self.strategy.is_continuous() && !self.store.is_empty() {
            self.refresh_visibility();
            let pins = self.pins();
            let input = LayoutInput {
                store: &self.store,
                visibility: &self.visibility,
                pins: &pins,
            };
            let moved = self.strategy.step(&input, dt);
            if !moved.is_empty() {
                self.apply_positions(moved);
                changed = true;
            }
        }
        changed
    }

    fn expire_new_flags(&mut self) -> bool {
        let now = self.clock;
        let expired: Vec<NodeId> = self
            .new_until
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return false;
        }
        for id in &expired {
            self.new_until.remove(id);
        }
        self.commit(|store| {
            for id in &expired {
                store.update(*id, &NodeUpdate::new().new_flag(false));
            }
        });
        true
    }

    pub fn render_set(&mut self) -> RenderSet {
        self.refresh_visibility();
        RenderSet::compute(
            &self.store,
            &self.visibility,
            &self.viewport,
            self.config.viewport.cull_margin,
            self.selected,
        )
    }

    pub fn minimap(&mut self) -> MinimapProjection {
        self.refresh_visibility();
        MinimapProjection::compute(
            &self.store,
            &self.visibility,
            &self.viewport,
            self.config.canvas_size,
            self.config.minimap_size,
        )
    }

    pub fn frame(&mut self) -> Frame {
        let render = self.render_set();
        let minimap = self.minimap();
        Frame {
            revision: self.store.revision(),
            node_count: self.store.len(),
            edge_count: self.store.edge_count(),
            layout_state: self.strategy.state(),
            edit_mode: self.edit_mode,
            render,
            minimap,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Apply `f` to a private copy of the store when the current snapshot is
    /// shared, then publish the result as the new snapshot.
    fn commit<R>(&mut self, f: impl FnOnce(&mut TreeStore) -> R) -> R {
        let store = Arc::make_mut(&mut self.store);
        f(store)
    }

    fn require(&self, id: NodeId) -> EngineResult<&Node> {
        self.store.get(id).ok_or(EngineError::NodeNotFound(id))
    }

    fn refresh_visibility(&mut self) {
        if !self.visibility.is_current(&self.store, self.edit_mode) {
            self.visibility = VisibilityMap::compute(&self.store, self.edit_mode);
        }
    }

    fn pins(&self) -> HashSet<NodeId> {
        self.selected.into_iter().chain(self.dragging).collect()
    }

    /// Let the strategy react to a structural change.
    fn relayout(&mut self) {
        self.refresh_visibility();
        let pins = self.pins();
        let input = LayoutInput {
            store: &self.store,
            visibility: &self.visibility,
            pins: &pins,
        };
        let moved = self.strategy.on_structure_change(&input);
        self.apply_positions(moved);
    }

    fn apply_positions(&mut self, positions: Positions) {
        if positions.is_empty() {
            return;
        }
        let pinned = self.dragging;
        self.commit(|store| {
            store.set_positions(positions.into_iter().filter(|(id, _)| Some(*id) != pinned))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thought_canvas_layout::LayoutMode;

    fn engine(mode: LayoutMode) -> LayoutEngine {
        LayoutEngine::new(EngineConfig {
            layout: mode,
            ..Default::default()
        })
        .unwrap()
    }

    fn suggestions(labels: &[&str]) -> Vec<TopicSuggestion> {
        labels.iter().map(|l| TopicSuggestion::new(*l, "")).collect()
    }

    #[test]
    fn snapshots_are_immutable() {
        let mut engine = engine(LayoutMode::Force);
        let req = engine.start_exploration("X").unwrap();
        let before = engine.snapshot();
        engine.complete_insight(&req, Ok(Insight::default()));
        let exp = engine.begin_expansion(req.node).unwrap().unwrap();
        engine.complete_expansion(&exp, Ok(suggestions(&["a", "b"])));
        assert_eq!(before.len(), 1);
        assert!(before.get(req.node).unwrap().is_loading);
        assert_eq!(engine.snapshot().len(), 3);
    }

    #[test]
    fn duplicate_and_blank_labels_are_dropped() {
        let mut engine = engine(LayoutMode::Deterministic);
        let req = engine.start_exploration("X").unwrap();
        engine.complete_insight(&req, Ok(Insight::default()));
        let exp = engine.begin_expansion(req.node).unwrap().unwrap();
        let out = engine.complete_expansion(&exp, Ok(suggestions(&["a", " ", "A", "b"])));
        let ExpansionOutcome::Attached(ids) = out else {
            panic!("expected attach, got {out:?}");
        };
        assert_eq!(ids.len(), 2);

        let again = engine.begin_expansion(req.node).unwrap().unwrap();
        assert_eq!(again.excluded, vec!["a".to_string(), "b".to_string()]);
        let out = engine.complete_expansion(&again, Ok(suggestions(&["b", "c"])));
        assert_eq!(out, ExpansionOutcome::Attached(vec![NodeId(ids[1].0 + 1)]));
    }

    #[test]
    fn new_flag_expires_with_the_clock() {
        let mut engine = engine(LayoutMode::Deterministic);
        let req = engine.start_exploration("X").unwrap();
        engine.complete_insight(&req, Ok(Insight::default()));
        let exp = engine.begin_expansion(req.node).unwrap().unwrap();
        let ExpansionOutcome::Attached(ids) =
            engine.complete_expansion(&exp, Ok(suggestions(&["a"])))
        else {
            panic!("expected attach");
        };
        assert!(engine.node(ids[0]).unwrap().is_new);
        engine.tick(1.0);
        assert!(engine.node(ids[0]).unwrap().is_new);
        engine.tick(1.0);
        assert!(!engine.node(ids[0]).unwrap().is_new);
    }

    #[test]
    fn failure_after_enrichment_keeps_description() {
        let mut engine = engine(LayoutMode::Deterministic);
        let req = engine.start_exploration("X").unwrap();
        engine.complete_insight(
            &req,
            Ok(Insight {
                description: "all about X".into(),
                sources: Vec::new(),
            }),
        );
        let exp = engine.begin_expansion(req.node).unwrap().unwrap();
        let out = engine.complete_expansion(&exp, Err(ServiceError::Transport("down".into())));
        assert!(matches!(out, ExpansionOutcome::Failed(_)));
        let node = engine.node(req.node).unwrap();
        assert_eq!(node.description, "all about X");
        assert!(!node.is_loading);
        assert!(node.last_error.as_deref().unwrap().contains("down"));
    }

    #[test]
    fn pinned_drag_target_is_not_overwritten() {
        let mut engine = engine(LayoutMode::Force);
        let req = engine.start_exploration("X").unwrap();
        engine.complete_insight(&req, Ok(Insight::default()));
        let exp = engine.begin_expansion(req.node).unwrap().unwrap();
        let ExpansionOutcome::Attached(ids) =
            engine.complete_expansion(&exp, Ok(suggestions(&["a", "b"])))
        else {
            panic!("expected attach");
        };
        engine.begin_drag(ids[0]).unwrap();
        let spot = Position::new(100.0, 100.0);
        engine.drag_to(spot);
        for _ in 0..10 {
            engine.tick(1.0 / 60.0);
        }
        assert_eq!(engine.node(ids[0]).unwrap().position, spot);
        engine.end_drag();
        assert!(engine.dragging().is_none());
    }

    #[test]
    fn empty_topic_is_rejected() {
        let mut engine = engine(LayoutMode::Force);
        assert!(matches!(
            engine.start_exploration("   "),
            Err(EngineError::EmptyTopic)
        ));
    }
}
