//! Continuous force-directed layout.
//!
//! Nodes behave as charged particles joined by springs. Every tick applies
//! pairwise repulsion, edge springs, a hierarchy pull that keeps generations
//! stacked, and weak gravity toward the canvas center, then integrates with
//! damping. Roots and caller-supplied pins are held in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thought_canvas_core::{NodeId, Position};
use tracing::debug;

use crate::error::LayoutError;
use crate::strategy::LayoutInput;
use crate::{Positions, Result};

/// Frame duration the force constants are tuned for.
const REFERENCE_DT: f32 = 1.0 / 60.0;
/// Upper bound on how many reference frames one step may integrate, so a
/// stalled tick does not fling nodes across the canvas.
const MAX_STEP_SCALE: f32 = 4.0;
/// Golden angle in radians, used to spread coincident pairs deterministically.
const GOLDEN_ANGLE: f32 = 2.399_963;
/// Consecutive quiet steps required before the layout counts as converged.
const REST_STEPS: u32 = 30;

/// Configuration for the force simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// Repulsion strength (force = repulsion / dist²).
    pub repulsion: f32,
    /// Multiplier on repulsion between nodes of the same level.
    pub same_level_scale: f32,
    /// Lower clamp on squared distance in the repulsion term.
    pub min_dist_sq: f32,
    /// Edge spring constant.
    pub attraction: f32,
    /// Rest length of edge springs, normally the level spacing.
    pub ideal_length: f32,
    /// Pull of a child's y toward `parent.y + ideal_length`.
    pub hierarchy_strength: f32,
    /// Pull toward the canvas center.
    pub gravity: f32,
    /// Velocity decay per reference frame (0-1).
    pub damping: f32,
    /// Velocity magnitude clamp.
    pub max_velocity: f32,
    /// Below this peak speed the layout counts as converged.
    pub rest_threshold: f32,
    /// Side length of the nominal canvas; gravity targets its center.
    pub canvas_size: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            repulsion: 40_000.0,
            same_level_scale: 2.5,
            min_dist_sq: 100.0,
            attraction: 0.01,
            ideal_length: 180.0,
            hierarchy_strength: 0.05,
            gravity: 0.0002,
            damping: 0.85,
            max_velocity: 25.0,
            rest_threshold: 0.05,
            canvas_size: 5000.0,
        }
    }
}

impl ForceConfig {
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, f32, bool); 6] = [
            ("repulsion", self.repulsion, self.repulsion >= 0.0),
            ("min_dist_sq", self.min_dist_sq, self.min_dist_sq > 0.0),
            ("ideal_length", self.ideal_length, self.ideal_length > 0.0),
            ("damping", self.damping, self.damping > 0.0 && self.damping < 1.0),
            ("max_velocity", self.max_velocity, self.max_velocity > 0.0),
            ("canvas_size", self.canvas_size, self.canvas_size > 0.0),
        ];
        for (name, value, ok) in checks {
            if !ok {
                return Err(LayoutError::InvalidConfig(format!(
                    "{name} out of range: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Current state of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutState {
    /// Nothing has been simulated yet.
    Idle,
    /// Nodes are still moving.
    Running,
    /// Stepping is suspended until resumed.
    Paused,
    /// Peak speed fell below the rest threshold.
    Converged,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}

/// CPU force-directed layout over the visible part of a tree.
#[derive(Debug, Clone)]
pub struct ForceSimulator {
    config: ForceConfig,
    velocities: HashMap<NodeId, Velocity>,
    state: LayoutState,
    iteration: u64,
    quiet_steps: u32,
}

impl ForceSimulator {
    pub fn new(config: ForceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            velocities: HashMap::new(),
            state: LayoutState::Idle,
            iteration: 0,
            quiet_steps: 0,
        })
    }

    pub fn config(&self) -> &ForceConfig {
        &self.config
    }

    pub fn state(&self) -> LayoutState {
        self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Current velocity of a node, zero if it has none.
    pub fn velocity(&self, id: NodeId) -> (f32, f32) {
        self.velocities
            .get(&id)
            .map_or((0.0, 0.0), |v| (v.x, v.y))
    }

    /// Resume stepping after a structural change or a drag.
    pub fn wake(&mut self) {
        self.quiet_steps = 0;
        if self.state != LayoutState::Paused {
            self.state = LayoutState::Running;
        }
    }

    pub fn pause(&mut self) {
        self.state = LayoutState::Paused;
    }

    pub fn resume(&mut self) {
        if self.state == LayoutState::Paused {
            self.state = LayoutState::Running;
        }
    }

    /// Advance the simulation by `dt` seconds and return the new positions of
    /// every node that moved.
    ///
    /// Only rendered nodes take part. Hidden and collapsed nodes keep their
    /// positions and exert no force.
    pub fn step(&mut self, input: &LayoutInput<'_>, dt: f32) -> Positions {
        if matches!(self.state, LayoutState::Paused | LayoutState::Converged) {
            return Vec::new();
        }
        let scale = (dt / REFERENCE_DT).clamp(0.0, MAX_STEP_SCALE);
        if scale == 0.0 {
            return Vec::new();
        }

        let cfg = &self.config;
        let nodes: Vec<_> = input
            .store
            .nodes()
            .filter(|n| input.visibility.is_visible(n.id))
            .collect();
        if nodes.is_empty() {
            self.state = LayoutState::Idle;
            return Vec::new();
        }
        let slot: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let mut force = vec![(0.0f32, 0.0f32); nodes.len()];

        // 1. Pairwise repulsion.
        for i in 0..nodes.len() {
            for j in (i + 1)..nodes.len() {
                let (a, b) = (nodes[i], nodes[j]);
                let mut dx = a.position.x - b.position.x;
                let mut dy = a.position.y - b.position.y;
                let raw_sq = dx * dx + dy * dy;
                if raw_sq < f32::EPSILON {
                    let angle = GOLDEN_ANGLE * (a.id.0 + b.id.0) as f32;
                    dx = angle.cos();
                    dy = angle.sin();
                }
                let dist = (dx * dx + dy * dy).sqrt();
                let dist_sq = raw_sq.max(cfg.min_dist_sq);
                let mut magnitude = cfg.repulsion / dist_sq;
                if a.level == b.level {
                    magnitude *= cfg.same_level_scale;
                }
                let (fx, fy) = (dx / dist * magnitude, dy / dist * magnitude);
                force[i].0 += fx;
                force[i].1 += fy;
                force[j].0 -= fx;
                force[j].1 -= fy;
            }
        }

        // 2. Edge springs.
        for edge in input.store.edges() {
            let (Some(&i), Some(&j)) = (slot.get(&edge.from), slot.get(&edge.to)) else {
                continue;
            };
            let dx = nodes[j].position.x - nodes[i].position.x;
            let dy = nodes[j].position.y - nodes[i].position.y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < f32::EPSILON {
                continue;
            }
            let magnitude = cfg.attraction * (dist - cfg.ideal_length);
            let (fx, fy) = (dx / dist * magnitude, dy / dist * magnitude);
            force[i].0 += fx;
            force[i].1 += fy;
            force[j].0 -= fx;
            force[j].1 -= fy;
        }

        // 3. Hierarchy and 4. gravity.
        let center = cfg.canvas_size / 2.0;
        for (i, node) in nodes.iter().enumerate() {
            if let Some(parent) = node.parent_id.and_then(|p| input.store.get(p)) {
                let target_y = parent.position.y + cfg.ideal_length;
                force[i].1 += cfg.hierarchy_strength * (target_y - node.position.y);
            }
            force[i].0 += cfg.gravity * (center - node.position.x);
            force[i].1 += cfg.gravity * (center - node.position.y);
        }

        // 5. Integration and 6. anchoring.
        let damping = cfg.damping.powf(scale);
        let mut moved = Vec::new();
        let mut peak = 0.0f32;
        for (i, node) in nodes.iter().enumerate() {
            if node.is_root() || input.pins.contains(&node.id) {
                self.velocities.insert(node.id, Velocity::default());
                continue;
            }
            let v = self.velocities.entry(node.id).or_default();
            v.x += force[i].0 * scale;
            v.y += force[i].1 * scale;
            let speed = (v.x * v.x + v.y * v.y).sqrt();
            if speed > cfg.max_velocity {
                v.x *= cfg.max_velocity / speed;
                v.y *= cfg.max_velocity / speed;
            }
            v.x *= damping;
            v.y *= damping;
            if !(v.x.is_finite() && v.y.is_finite()) {
                *v = Velocity::default();
                continue;
            }
            peak = peak.max((v.x * v.x + v.y * v.y).sqrt());
            if v.x != 0.0 || v.y != 0.0 {
                moved.push((node.id, node.position.offset(v.x * scale, v.y * scale)));
            }
        }

        self.velocities.retain(|id, _| slot.contains_key(id));
        self.iteration += 1;
        if peak < cfg.rest_threshold {
            self.quiet_steps += 1;
        } else {
            self.quiet_steps = 0;
        }
        if self.quiet_steps >= REST_STEPS {
            self.state = LayoutState::Converged;
            debug!(iteration = self.iteration, nodes = nodes.len(), "force_layout_converged");
        } else {
            self.state = LayoutState::Running;
        }
        moved
    }
}
