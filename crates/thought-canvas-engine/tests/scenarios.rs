//! End-to-end scenarios for the synchronous layout engine.
//!
//! Service responses are fed in directly, so every interleaving of requests,
//! prunes and failures can be reproduced without a runtime.

use thought_canvas_core::{NodeId, Position};
use thought_canvas_engine::{
    EngineConfig, ExpansionOutcome, Insight, InsightOutcome, LayoutEngine, ServiceError,
    TopicSuggestion,
};
use thought_canvas_layout::{LayoutMode, LayoutState};

// ============================================================================
// Helpers
// ============================================================================

fn engine(mode: LayoutMode) -> LayoutEngine {
    LayoutEngine::new(EngineConfig {
        layout: mode,
        ..Default::default()
    })
    .unwrap()
}

/// Start an exploration and complete its insight.
fn start(engine: &mut LayoutEngine, topic: &str) -> NodeId {
    let request = engine.start_exploration(topic).unwrap();
    let outcome = engine.complete_insight(
        &request,
        Ok(Insight {
            description: format!("about {topic}"),
            sources: Vec::new(),
        }),
    );
    assert_eq!(outcome, InsightOutcome::Applied);
    request.node
}

/// Expand `id` and answer with `labels`.
fn expand(engine: &mut LayoutEngine, id: NodeId, labels: &[&str]) -> Vec<NodeId> {
    let request = engine.begin_expansion(id).unwrap().unwrap();
    let answer = labels
        .iter()
        .map(|l| TopicSuggestion::new(*l, format!("{l} explained")))
        .collect();
    match engine.complete_expansion(&request, Ok(answer)) {
        ExpansionOutcome::Attached(ids) => ids,
        other => panic!("expected children, got {other:?}"),
    }
}

// ============================================================================
// Expansion
// ============================================================================

#[test]
fn root_with_three_children() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B", "C"]);
    assert_eq!(kids.len(), 3);

    let store = engine.store();
    for (id, label) in kids.iter().zip(["A", "B", "C"]) {
        let node = store.get(*id).unwrap();
        assert_eq!(node.level, 1);
        assert_eq!(node.parent_id, Some(root));
        assert_eq!(node.path, vec!["X".to_string(), label.to_string()]);
        assert!(node.is_new);
    }
    let edges = store.edges();
    assert_eq!(edges.len(), 3);
    assert!(edges.iter().all(|e| e.from == root));
    let mut targets: Vec<NodeId> = edges.iter().map(|e| e.to).collect();
    targets.sort();
    assert_eq!(targets, kids);

    let parent = store.get(root).unwrap();
    assert!(parent.is_expanded);
    assert!(!parent.is_loading);
}

#[test]
fn second_expansion_while_loading_is_a_no_op() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let child = expand(&mut engine, root, &["A"])[0];

    let first = engine.begin_expansion(child).unwrap().unwrap();
    assert!(engine.node(child).unwrap().is_loading);
    assert!(engine.begin_expansion(child).unwrap().is_none());
    assert!(engine.begin_insight(child).unwrap().is_none());

    let ExpansionOutcome::Attached(ids) = engine.complete_expansion(
        &first,
        Ok(vec![TopicSuggestion::new("A1", ""), TopicSuggestion::new("A2", "")]),
    ) else {
        panic!("expected children");
    };
    assert_eq!(ids.len(), 2);
    assert_eq!(engine.store().children_of(child).len(), 2);
    assert_eq!(engine.store().len(), 4);
}

#[test]
fn response_for_pruned_node_is_discarded() {
    let mut engine = engine(LayoutMode::Deterministic);
    let root = start(&mut engine, "X");
    let child = expand(&mut engine, root, &["A", "B"])[0];

    let request = engine.begin_expansion(child).unwrap().unwrap();
    engine.prune(child).unwrap();
    let revision = engine.store().revision();

    let outcome = engine.complete_expansion(&request, Ok(vec![TopicSuggestion::new("late", "")]));
    assert_eq!(outcome, ExpansionOutcome::Discarded);
    assert_eq!(engine.store().len(), 2);
    assert_eq!(engine.store().revision(), revision);
}

#[test]
fn failed_first_response_shows_fallback() {
    let mut engine = engine(LayoutMode::Force);
    let request = engine.start_exploration("X").unwrap();
    assert_eq!(
        engine.node(request.node).unwrap().description,
        engine.config().expansion.loading_placeholder
    );

    let outcome = engine.complete_insight(
        &request,
        Err(ServiceError::Status {
            status: 503,
            message: "unavailable".into(),
        }),
    );
    assert!(matches!(outcome, InsightOutcome::Failed(_)));

    let root = engine.node(request.node).unwrap();
    assert!(!root.is_loading);
    assert_eq!(root.description, engine.config().expansion.fallback_description);
    assert!(root.last_error.as_deref().unwrap().contains("503"));

    // A later success clears the error.
    let again = engine.begin_insight(request.node).unwrap().unwrap();
    engine.complete_insight(&again, Ok(Insight::default()));
    assert!(engine.node(request.node).unwrap().last_error.is_none());
}

#[test]
fn malformed_children_response_is_recovered() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let request = engine.begin_expansion(root).unwrap().unwrap();
    let outcome = engine.complete_expansion(
        &request,
        Err(ServiceError::MalformedResponse("not json".into())),
    );
    assert!(matches!(outcome, ExpansionOutcome::Failed(_)));
    let node = engine.node(root).unwrap();
    assert!(!node.is_loading);
    assert!(!node.is_expanded);
    assert_eq!(node.description, "about X");
}

#[test]
fn re_expansion_excludes_existing_children() {
    let mut engine = engine(LayoutMode::Deterministic);
    let root = start(&mut engine, "X");
    expand(&mut engine, root, &["A", "B"]);

    let request = engine.begin_expansion(root).unwrap().unwrap();
    assert_eq!(request.excluded, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(request.ancestor_path, vec!["X".to_string()]);

    let ExpansionOutcome::Attached(more) = engine.complete_expansion(
        &request,
        Ok(vec![TopicSuggestion::new("a", ""), TopicSuggestion::new("C", "")]),
    ) else {
        panic!("expected children");
    };
    assert_eq!(more.len(), 1);
    assert_eq!(engine.node(more[0]).unwrap().label, "C");
    assert_eq!(engine.store().children_of(root).len(), 3);
}

// ============================================================================
// Pruning and orphans
// ============================================================================

#[test]
fn pruning_removes_exactly_incident_edges() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B", "C"]);
    let grandkids = expand(&mut engine, kids[0], &["A1", "A2"]);
    assert_eq!(engine.store().len(), 6);
    assert_eq!(engine.store().edge_count(), 5);

    let removed = engine.prune(kids[0]).unwrap();
    assert_eq!(removed.label, "A");

    let store = engine.store();
    assert_eq!(store.len(), 5);
    assert_eq!(store.edge_count(), 2);
    assert!(store
        .edges()
        .iter()
        .all(|e| e.from != kids[0] && e.to != kids[0]));
    for g in &grandkids {
        assert!(store.contains(*g));
        assert!(store.is_orphan(*g));
        assert!(store.ancestors_of(*g).is_empty());
    }
}

#[test]
fn orphans_keep_rendering_and_laying_out() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A"]);
    let grandkids = expand(&mut engine, kids[0], &["A1", "A2"]);
    engine.prune(kids[0]).unwrap();

    for _ in 0..30 {
        engine.tick(1.0 / 60.0);
    }
    let frame = engine.frame();
    assert_eq!(frame.node_count, 3);
    assert_eq!(frame.edge_count, 0);
    assert_eq!(frame.minimap.dots.len(), 3);
    for g in &grandkids {
        let p = engine.node(*g).unwrap().position;
        assert!(p.is_finite());
        assert!(engine.visibility().is_visible(*g));
    }
    assert!(frame.render.edges.is_empty());
}

#[test]
fn pruning_unknown_node_is_an_error() {
    let mut engine = engine(LayoutMode::Force);
    start(&mut engine, "X");
    assert!(engine.prune(NodeId(99)).is_err());
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn deterministic_layout_keeps_min_gap_per_level() {
    let mut engine = engine(LayoutMode::Deterministic);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B", "C", "D"]);
    for (i, kid) in kids.iter().enumerate() {
        let labels: Vec<String> = (0..4).map(|j| format!("{i}-{j}")).collect();
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        expand(&mut engine, *kid, &refs);
    }
    assert_eq!(engine.layout_state(), LayoutState::Converged);

    let min_gap = engine.config().resolver.min_gap;
    let store = engine.store();
    for level in 1..=2 {
        let mut xs: Vec<f32> = store
            .nodes()
            .filter(|n| n.level == level)
            .map(|n| n.position.x)
            .collect();
        xs.sort_by(f32::total_cmp);
        for pair in xs.windows(2) {
            assert!(
                pair[1] - pair[0] >= min_gap - 1e-3,
                "level {level}: {} and {} too close",
                pair[0],
                pair[1]
            );
        }
    }
}

#[test]
fn force_layout_keeps_children_below_a_fixed_root() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let origin = engine.node(root).unwrap().position;
    let kids = expand(&mut engine, root, &["A", "B", "C"]);

    for _ in 0..240 {
        engine.tick(1.0 / 60.0);
    }
    assert_eq!(engine.node(root).unwrap().position, origin);
    for kid in &kids {
        let p = engine.node(*kid).unwrap().position;
        assert!(p.is_finite());
        assert!(p.y > origin.y, "{kid} at {p:?}");
    }
}

#[test]
fn selected_node_is_pinned() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B", "C"]);
    engine.select(Some(kids[1])).unwrap();
    let held = engine.node(kids[1]).unwrap().position;
    for _ in 0..60 {
        engine.tick(1.0 / 60.0);
    }
    assert_eq!(engine.node(kids[1]).unwrap().position, held);
    assert!(engine.select(Some(NodeId(42))).is_err());
}

#[test]
fn drag_in_deterministic_mode_reresolves_on_release() {
    let mut engine = engine(LayoutMode::Deterministic);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B"]);
    let b = engine.node(kids[1]).unwrap().position;

    // Drop A right on top of B.
    engine.begin_drag(kids[0]).unwrap();
    engine.drag_to(b);
    assert_eq!(engine.node(kids[0]).unwrap().position, b);
    engine.end_drag();

    let a = engine.node(kids[0]).unwrap().position;
    let b = engine.node(kids[1]).unwrap().position;
    assert!((a.x - b.x).abs() >= engine.config().resolver.min_gap - 1e-3);
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn collapse_hides_descendants_in_every_mode() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A"]);
    let grandkids = expand(&mut engine, kids[0], &["A1"]);
    let great = expand(&mut engine, grandkids[0], &["A1a"]);

    assert!(engine.toggle_collapse(kids[0]).unwrap());
    for edit in [false, true] {
        engine.set_edit_mode(edit);
        let render = engine.render_set();
        assert!(render.node(kids[0]).is_some());
        assert!(render.node(grandkids[0]).is_none());
        assert!(render.node(great[0]).is_none());
    }

    assert!(!engine.toggle_collapse(kids[0]).unwrap());
    assert!(engine.render_set().node(great[0]).is_some());
}

#[test]
fn hidden_nodes_are_dimmed_in_edit_mode() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A", "B"]);
    engine.set_hidden(kids[0], true).unwrap();

    assert!(engine.render_set().node(kids[0]).is_none());
    engine.set_edit_mode(true);
    let render = engine.render_set();
    assert!(render.node(kids[0]).unwrap().dimmed);
    assert!(!render.node(kids[1]).unwrap().dimmed);
    assert!(engine.frame().edit_mode);
}

#[test]
fn is_new_flag_clears_after_delay() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kids = expand(&mut engine, root, &["A"]);
    let delay = engine.config().expansion.new_flag_secs;

    let steps = (delay * 60.0).ceil() as usize + 1;
    for _ in 0..steps {
        engine.tick(1.0 / 60.0);
    }
    assert!(!engine.node(kids[0]).unwrap().is_new);
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn root_starts_centered_and_focus_animates() {
    let mut engine = engine(LayoutMode::Deterministic);
    let root = start(&mut engine, "X");
    let size = engine.viewport().size();
    let center = Position::new(size.width / 2.0, size.height / 2.0);

    let render = engine.render_set();
    assert!(render.node(root).unwrap().screen.distance(center) < 1e-2);

    let kids = expand(&mut engine, root, &["A", "B", "C"]);
    engine.focus(kids[2]).unwrap();
    assert!(engine.viewport().is_animating());
    for _ in 0..180 {
        engine.tick(1.0 / 60.0);
    }
    assert!(!engine.viewport().is_animating());
    let target = engine.node(kids[2]).unwrap().position;
    assert!(engine.viewport().world_to_screen(target).distance(center) < 1.0);
}

#[test]
fn drag_follows_screen_coordinates() {
    let mut engine = engine(LayoutMode::Force);
    let root = start(&mut engine, "X");
    let kid = expand(&mut engine, root, &["A"])[0];
    engine.viewport_mut().zoom_at(2.0, Position::new(100.0, 100.0));

    engine.begin_drag(kid).unwrap();
    let screen = Position::new(300.0, 250.0);
    engine.drag_to_screen(screen);
    let world = engine.node(kid).unwrap().position;
    assert!(engine.viewport().world_to_screen(world).distance(screen) < 1e-2);
}
