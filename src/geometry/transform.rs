//! Pan/zoom transform between screen and map coordinates
//!
//! `map = (screen - pan) / zoom`, `screen = map * zoom + pan`. Zoom is
//! anchored at the canvas origin: changing it leaves `pan` untouched, so the
//! point under the pointer moves. That is the intended behaviour, not
//! pointer-centred zooming.

use emath::{Pos2, Vec2};
use serde::{Deserialize, Serialize};

pub const MIN_ZOOM: f32 = 0.35;
pub const MAX_ZOOM: f32 = 2.2;
/// Zoom change per wheel tick
pub const ZOOM_STEP: f32 = 0.07;

/// Persisted slice of the view (centre is in map coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub zoom: f32,
    pub center_x: f32,
    pub center_y: f32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            center_x: 0.0,
            center_y: 0.0,
        }
    }
}

/// Affine screen/map mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub pan: Vec2,
    zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new(pan: Vec2, zoom: f32) -> Self {
        Self {
            pan,
            zoom: clamp_zoom(zoom),
        }
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = clamp_zoom(zoom);
    }

    /// One wheel tick. Negative `delta_y` (scroll up) zooms in.
    pub fn wheel(&mut self, delta_y: f32) {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return;
        }
        let step = if delta_y < 0.0 { ZOOM_STEP } else { -ZOOM_STEP };
        self.set_zoom(self.zoom + step);
    }

    pub fn screen_to_map(&self, screen: Pos2) -> Pos2 {
        ((screen.to_vec2() - self.pan) / self.zoom).to_pos2()
    }

    pub fn map_to_screen(&self, map: Pos2) -> Pos2 {
        (map.to_vec2() * self.zoom + self.pan).to_pos2()
    }

    /// Map point under the centre of a canvas of `size`
    pub fn center(&self, size: Vec2) -> Pos2 {
        self.screen_to_map((size / 2.0).to_pos2())
    }

    pub fn to_view_state(&self, size: Vec2) -> ViewState {
        let center = self.center(size);
        ViewState {
            zoom: self.zoom,
            center_x: center.x,
            center_y: center.y,
        }
    }

    /// Inverse of `to_view_state` for a canvas of `size`
    pub fn from_view_state(state: &ViewState, size: Vec2) -> Self {
        let zoom = clamp_zoom(state.zoom);
        let center = Vec2::new(state.center_x, state.center_y);
        Self {
            pan: size / 2.0 - center * zoom,
            zoom,
        }
    }
}

fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}
