//! Initial positions for freshly created nodes.

use serde::{Deserialize, Serialize};
use thought_canvas_core::Position;

use crate::error::LayoutError;
use crate::Result;

/// Spacing used when placing new nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Vertical distance between a parent and its children.
    pub level_spacing: f32,
    /// Horizontal distance between neighbouring siblings.
    pub sibling_spacing: f32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            level_spacing: 180.0,
            sibling_spacing: 240.0,
        }
    }
}

impl PlacementConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.level_spacing > 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "level_spacing must be positive, got {}",
                self.level_spacing
            )));
        }
        if !(self.sibling_spacing > 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "sibling_spacing must be positive, got {}",
                self.sibling_spacing
            )));
        }
        Ok(())
    }
}

/// Where a new root goes: the middle of the canvas.
pub fn root_position(canvas_size: f32) -> Position {
    Position::new(canvas_size / 2.0, canvas_size / 2.0)
}

/// Positions for `count` new children of a node at `parent`.
///
/// A first expansion spreads the children symmetrically around the parent's
/// x. When `existing` children are already present the new ones continue to
/// the right of the rightmost of them.
pub fn place_children(
    parent: Position,
    existing: &[Position],
    count: usize,
    config: &PlacementConfig,
) -> Vec<Position> {
    let y = parent.y + config.level_spacing;
    let rightmost = existing
        .iter()
        .map(|p| p.x)
        .fold(None, |acc: Option<f32>, x| Some(acc.map_or(x, |a| a.max(x))));

    match rightmost {
        Some(right) => (1..=count)
            .map(|i| Position::new(right + i as f32 * config.sibling_spacing, y))
            .collect(),
        None => {
            let half_span = (count.saturating_sub(1)) as f32 / 2.0;
            (0..count)
                .map(|i| {
                    let offset = (i as f32 - half_span) * config.sibling_spacing;
                    Position::new(parent.x + offset, y)
                })
                .collect()
        }
    }
}
