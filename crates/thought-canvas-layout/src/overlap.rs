//! Deterministic sweep that pushes same-level subtrees apart.
//!
//! Each pass walks the levels top-down, sorts the participating nodes of a
//! level by x and cascades left to right: a node closer than `min_gap` to its
//! placed left neighbour is pushed to `min_gap` past it. The resulting
//! per-node offsets translate whole subtrees so parent/child offsets are
//! preserved. Pushing a parent can crowd a lower level, and a split run can
//! reach a neighbouring run, so passes repeat until nothing moves or the
//! iteration cap is reached.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thought_canvas_core::{Node, NodeId, Position, TreeStore};
use tracing::{debug, warn};

use crate::error::LayoutError;
use crate::{Positions, Result};

/// Which side of a too-close pair gets moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushMode {
    /// Move only the right subtree by the full shortfall.
    #[default]
    RightOnly,
    /// Spread each crowded run evenly around its centre. For a single pair
    /// both subtrees move apart by half the shortfall.
    Split,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum horizontal distance between adjacent nodes of one level.
    pub min_gap: f32,
    /// Hard cap on full sweeps.
    pub max_iterations: u32,
    pub push: PushMode,
    /// Extra distance added to every push so a resolved pair lands strictly
    /// beyond `min_gap` despite float rounding.
    pub epsilon: f32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_gap: 220.0,
            max_iterations: 60,
            push: PushMode::RightOnly,
            epsilon: 0.5,
        }
    }
}

impl ResolverConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.min_gap > 0.0) || !self.min_gap.is_finite() {
            return Err(LayoutError::InvalidConfig(format!(
                "min_gap must be positive and finite, got {}",
                self.min_gap
            )));
        }
        if self.max_iterations == 0 {
            return Err(LayoutError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !(self.epsilon >= 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "epsilon must be non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// Outcome of one [`OverlapResolver::resolve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolveReport {
    /// Sweeps performed, including the final clean one when converged.
    pub iterations: u32,
    /// False when the cap was hit with conflicts remaining.
    pub converged: bool,
    /// Number of nodes whose position changed.
    pub moved: usize,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// New positions for every node that moved.
    pub positions: Positions,
    pub report: ResolveReport,
}

#[derive(Debug, Clone, Default)]
pub struct OverlapResolver {
    config: ResolverConfig,
}

impl OverlapResolver {
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve overlaps among nodes accepted by `include`.
    ///
    /// Excluded nodes are not compared against anything, but they still
    /// travel with their ancestors when a subtree is pushed.
    pub fn resolve<F>(&self, store: &TreeStore, include: F) -> Resolution
    where
        F: Fn(&Node) -> bool,
    {
        let original: HashMap<NodeId, Position> =
            store.nodes().map(|n| (n.id, n.position)).collect();
        let mut pos = original.clone();

        // Id order doubles as insertion order, which keeps the x sort stable.
        let mut levels: BTreeMap<u32, Vec<NodeId>> = BTreeMap::new();
        for node in store.nodes().filter(|n| include(n)) {
            levels.entry(node.level).or_default().push(node.id);
        }

        let mut subtrees: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut subtree_of = |id: NodeId| -> Vec<NodeId> {
            subtrees
                .entry(id)
                .or_insert_with(|| {
                    let mut ids = vec![id];
                    ids.extend(store.descendants_of(id).iter().map(|n| n.id));
                    ids
                })
                .clone()
        };

        let min_gap = self.config.min_gap;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut changed = false;

            for ids in levels.values_mut() {
                ids.sort_by(|a, b| {
                    let ax = pos.get(a).map_or(0.0, |p| p.x);
                    let bx = pos.get(b).map_or(0.0, |p| p.x);
                    ax.total_cmp(&bx)
                });

                let xs: Vec<f32> = ids
                    .iter()
                    .map(|id| pos.get(id).map_or(0.0, |p| p.x))
                    .collect();
                let offsets = self.level_offsets(&xs);
                for (id, dx) in ids.iter().zip(offsets) {
                    if dx != 0.0 {
                        shift(&mut pos, &subtree_of(*id), dx);
                        changed = true;
                    }
                }
            }

            if !changed {
                converged = true;
                break;
            }
        }

        let positions: Positions = store
            .nodes()
            .filter_map(|n| {
                let now = pos.get(&n.id).copied()?;
                (original.get(&n.id) != Some(&now)).then_some((n.id, now))
            })
            .collect();

        let report = ResolveReport {
            iterations,
            converged,
            moved: positions.len(),
        };
        if converged {
            debug!(iterations, moved = report.moved, "overlap_resolved");
        } else {
            warn!(
                iterations,
                moved = report.moved,
                min_gap,
                "overlap_resolver_exhausted"
            );
        }
        Resolution { positions, report }
    }

    /// Horizontal offset for each of `xs` (sorted ascending) that clears
    /// every gap below `min_gap` on the level.
    fn level_offsets(&self, xs: &[f32]) -> Vec<f32> {
        let min_gap = self.config.min_gap;
        let step = min_gap + self.config.epsilon;
        let mut placed: Vec<f32> = Vec::with_capacity(xs.len());
        for &x in xs {
            let target = match placed.last() {
                Some(&prev) if x - prev < min_gap => prev + step,
                _ => x,
            };
            placed.push(target);
        }
        let mut offsets: Vec<f32> = placed.iter().zip(xs).map(|(t, x)| t - x).collect();
        if self.config.push == PushMode::RightOnly {
            return offsets;
        }

        // Runs of touching nodes are recentred so the push is shared.
        let touch = step + self.config.epsilon;
        let mut start = 0;
        for end in 1..=placed.len() {
            if end < placed.len() && placed[end] - placed[end - 1] <= touch {
                continue;
            }
            let run = &mut offsets[start..end];
            let mean = run.iter().sum::<f32>() / run.len() as f32;
            if mean != 0.0 {
                run.iter_mut().for_each(|dx| *dx -= mean);
            }
            start = end;
        }
        offsets
    }
}

fn shift(pos: &mut HashMap<NodeId, Position>, ids: &[NodeId], dx: f32) {
    for id in ids {
        if let Some(p) = pos.get_mut(id) {
            p.x += dx;
        }
    }
}
