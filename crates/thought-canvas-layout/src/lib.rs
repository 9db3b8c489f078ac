//! Position assignment for Thought Canvas trees.
//!
//! Two strategies express the same stability goal (siblings don't overlap,
//! children sit below parents) by different means:
//!
//! ```text
//!   structure change ──▶ DeterministicLayout ──▶ OverlapResolver sweep
//!                                                  (subtree pushes per level)
//!
//!   every frame ───────▶ ForceLayout ──────────▶ ForceSimulator step
//!                                                  repulsion, springs,
//!                                                  hierarchy, gravity,
//!                                                  damped integration
//! ```
//!
//! Exactly one is active per engine, selected by [`LayoutMode`]. New nodes
//! get their starting positions from [`placement`] in either case.

mod error;
pub mod force;
pub mod overlap;
pub mod placement;
pub mod strategy;

pub use error::LayoutError;
pub use force::{ForceConfig, ForceSimulator, LayoutState};
pub use overlap::{OverlapResolver, PushMode, Resolution, ResolveReport, ResolverConfig};
pub use placement::{place_children, root_position, PlacementConfig};
pub use strategy::{
    build_strategy, DeterministicLayout, ForceLayout, LayoutInput, LayoutMode, LayoutStrategy,
};

use thought_canvas_core::{NodeId, Position};

/// Result type for layout operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// New positions keyed by node.
pub type Positions = Vec<(NodeId, Position)>;
