//! Camera over the world canvas.
//!
//! `scroll` is the screen-space offset of the visible window's origin, i.e.
//! world coordinates multiplied by `zoom`:
//!
//! ```text
//! screen = world * zoom - scroll
//! world  = (screen + scroll) / zoom
//! ```

use serde::{Deserialize, Serialize};
use thought_canvas_core::{Position, Rect, Size};

use crate::config::ViewportConfig;

/// Below this screen distance an animated transition snaps to its target.
const SNAP_DISTANCE: f32 = 0.5;

/// Camera state handed to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub zoom: f32,
    pub scroll: Position,
    pub size: Size,
}

/// Pivot-preserving zoom, panning and animated centering.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    zoom: f32,
    scroll: Position,
    size: Size,
    min_zoom: f32,
    max_zoom: f32,
    transition_rate: f32,
    /// World point being animated toward the viewport center.
    target: Option<Position>,
}

impl Viewport {
    pub fn new(config: &ViewportConfig) -> Self {
        Self {
            zoom: config.initial_zoom.clamp(config.min_zoom, config.max_zoom),
            scroll: Position::ORIGIN,
            size: Size::new(config.width, config.height),
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            transition_rate: config.transition_rate,
            target: None,
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn scroll(&self) -> Position {
        self.scroll
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn zoom_range(&self) -> (f32, f32) {
        (self.min_zoom, self.max_zoom)
    }

    pub fn camera(&self) -> Camera {
        Camera {
            zoom: self.zoom,
            scroll: self.scroll,
            size: self.size,
        }
    }

    /// World point an animated transition is heading for, if any.
    pub fn transition_target(&self) -> Option<Position> {
        self.target
    }

    pub fn is_animating(&self) -> bool {
        self.target.is_some()
    }

    pub fn set_size(&mut self, size: Size) {
        if size.width > 0.0 && size.height > 0.0 {
            self.size = size;
        }
    }

    pub fn world_to_screen(&self, world: Position) -> Position {
        Position::new(
            world.x * self.zoom - self.scroll.x,
            world.y * self.zoom - self.scroll.y,
        )
    }

    pub fn screen_to_world(&self, screen: Position) -> Position {
        Position::new(
            (screen.x + self.scroll.x) / self.zoom,
            (screen.y + self.scroll.y) / self.zoom,
        )
    }

    /// Set the zoom while keeping the world point under `pivot` (a screen
    /// coordinate) fixed. Non-finite zoom values are ignored.
    ///
    /// A running transition keeps its world target and continues at the new
    /// zoom.
    pub fn zoom_at(&mut self, new_zoom: f32, pivot: Position) {
        if !new_zoom.is_finite() {
            return;
        }
        let world = self.screen_to_world(pivot);
        self.zoom = new_zoom.clamp(self.min_zoom, self.max_zoom);
        self.scroll = Position::new(world.x * self.zoom - pivot.x, world.y * self.zoom - pivot.y);
    }

    /// Multiply the zoom by `factor` around `pivot`, as a wheel handler would.
    pub fn zoom_by(&mut self, factor: f32, pivot: Position) {
        self.zoom_at(self.zoom * factor, pivot);
    }

    /// Zoom around the viewport center.
    pub fn zoom_centered(&mut self, new_zoom: f32) {
        let center = Position::new(self.size.width / 2.0, self.size.height / 2.0);
        self.zoom_at(new_zoom, center);
    }

    /// Move the window by a screen-space delta. Cancels any transition.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        self.target = None;
        self.scroll = self.scroll.offset(dx, dy);
    }

    /// Scroll that puts `world` at the viewport center at the current zoom.
    fn centered_scroll(&self, world: Position) -> Position {
        Position::new(
            world.x * self.zoom - self.size.width / 2.0,
            world.y * self.zoom - self.size.height / 2.0,
        )
    }

    /// Jump so that `world` is centered. Cancels any transition.
    pub fn center_on(&mut self, world: Position) {
        self.target = None;
        self.scroll = self.centered_scroll(world);
    }

    /// Start (or retarget) an animated move that centers `world`.
    pub fn animate_to(&mut self, world: Position) {
        self.target = Some(world);
    }

    /// Advance a running transition by `dt` seconds. Returns whether the
    /// scroll changed.
    pub fn advance(&mut self, dt: f32) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let goal = self.centered_scroll(target);
        let t = 1.0 - (-self.transition_rate * dt.max(0.0)).exp();
        let next = Position::new(
            self.scroll.x + (goal.x - self.scroll.x) * t,
            self.scroll.y + (goal.y - self.scroll.y) * t,
        );
        if next.distance(goal) < SNAP_DISTANCE {
            self.scroll = goal;
            self.target = None;
        } else {
            self.scroll = next;
        }
        true
    }

    /// The visible area in world coordinates.
    pub fn world_rect(&self) -> Rect {
        let min = self.screen_to_world(Position::ORIGIN);
        let max = self.screen_to_world(Position::new(self.size.width, self.size.height));
        Rect::new(min.x, min.y, max.x, max.y)
    }
}
