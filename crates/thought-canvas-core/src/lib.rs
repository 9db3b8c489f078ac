//! Core data model for Thought Canvas.
//!
//! Holds the node/edge forest that the layout strategies, the viewport and
//! the renderer all read from, together with the rules that decide which
//! nodes are currently visible.

pub mod error;
pub mod geometry;
pub mod model;
pub mod store;
pub mod visibility;

pub use error::{StoreError, StoreResult};
pub use geometry::{Position, Rect, Size};
pub use model::{Edge, EdgeId, Node, NodeId, NodeUpdate, Source};
pub use store::TreeStore;
pub use visibility::{classify, is_visible, Visibility, VisibilityMap};
