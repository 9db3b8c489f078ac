//! The single interface the engine drives layout through.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thought_canvas_core::{NodeId, TreeStore, VisibilityMap};
use tracing::debug;

use crate::force::{ForceConfig, ForceSimulator, LayoutState};
use crate::overlap::{OverlapResolver, ResolveReport, ResolverConfig};
use crate::{Positions, Result};

/// Which strategy positions the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Continuous force simulation stepped every frame.
    #[default]
    Force,
    /// One-shot overlap resolution after every structural change.
    Deterministic,
}

impl std::str::FromStr for LayoutMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "force" => Ok(LayoutMode::Force),
            "deterministic" | "resolver" => Ok(LayoutMode::Deterministic),
            other => Err(format!("unknown layout mode '{other}'")),
        }
    }
}

impl std::fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutMode::Force => write!(f, "force"),
            LayoutMode::Deterministic => write!(f, "deterministic"),
        }
    }
}

/// Read-only view a strategy works from.
#[derive(Clone, Copy)]
pub struct LayoutInput<'a> {
    pub store: &'a TreeStore,
    pub visibility: &'a VisibilityMap,
    /// Nodes held in place besides roots (selection, drag).
    pub pins: &'a HashSet<NodeId>,
}

/// A position-assignment strategy.
pub trait LayoutStrategy: Send + std::fmt::Debug {
    fn mode(&self) -> LayoutMode;

    /// Called after nodes are added, removed, collapsed, hidden or dropped
    /// after a drag. Returns positions to apply immediately.
    fn on_structure_change(&mut self, input: &LayoutInput<'_>) -> Positions;

    /// Called once per animation frame.
    fn step(&mut self, input: &LayoutInput<'_>, dt: f32) -> Positions;

    /// Whether `step` ever produces movement.
    fn is_continuous(&self) -> bool;

    fn state(&self) -> LayoutState;
}

/// Overlap resolution only. `step` is inert.
#[derive(Debug, Clone)]
pub struct DeterministicLayout {
    resolver: OverlapResolver,
    last_report: Option<ResolveReport>,
}

impl DeterministicLayout {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        Ok(Self {
            resolver: OverlapResolver::new(config)?,
            last_report: None,
        })
    }

    pub fn last_report(&self) -> Option<ResolveReport> {
        self.last_report
    }
}

impl LayoutStrategy for DeterministicLayout {
    fn mode(&self) -> LayoutMode {
        LayoutMode::Deterministic
    }

    fn on_structure_change(&mut self, input: &LayoutInput<'_>) -> Positions {
        let visibility = input.visibility;
        let resolution = self
            .resolver
            .resolve(input.store, |n| visibility.is_visible(n.id));
        self.last_report = Some(resolution.report);
        resolution.positions
    }

    fn step(&mut self, _input: &LayoutInput<'_>, _dt: f32) -> Positions {
        Vec::new()
    }

    fn is_continuous(&self) -> bool {
        false
    }

    fn state(&self) -> LayoutState {
        match self.last_report {
            None => LayoutState::Idle,
            Some(_) => LayoutState::Converged,
        }
    }
}

/// Force simulation. Structural changes only wake it up.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    simulator: ForceSimulator,
}

impl ForceLayout {
    pub fn new(config: ForceConfig) -> Result<Self> {
        Ok(Self {
            simulator: ForceSimulator::new(config)?,
        })
    }

    pub fn simulator(&self) -> &ForceSimulator {
        &self.simulator
    }
}

impl LayoutStrategy for ForceLayout {
    fn mode(&self) -> LayoutMode {
        LayoutMode::Force
    }

    fn on_structure_change(&mut self, _input: &LayoutInput<'_>) -> Positions {
        self.simulator.wake();
        Vec::new()
    }

    fn step(&mut self, input: &LayoutInput<'_>, dt: f32) -> Positions {
        self.simulator.step(input, dt)
    }

    fn is_continuous(&self) -> bool {
        true
    }

    fn state(&self) -> LayoutState {
        self.simulator.state()
    }
}

/// Build the strategy selected by `mode`.
pub fn build_strategy(
    mode: LayoutMode,
    resolver: ResolverConfig,
    force: ForceConfig,
) -> Result<Box<dyn LayoutStrategy>> {
    debug!(%mode, "layout_strategy_selected");
    Ok(match mode {
        LayoutMode::Force => Box::new(ForceLayout::new(force)?),
        LayoutMode::Deterministic => Box::new(DeterministicLayout::new(resolver)?),
    })
}
