//! Golden-angle radial placement
//!
//! The n-th item sits at angle `n * 137.5°` and radius `base + n * step`
//! around an anchor. Successive items never line up on the same ray, so the
//! spiral spreads out without a collision pass.

use emath::{Pos2, Vec2};

pub const GOLDEN_ANGLE_DEG: f32 = 137.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpiralConfig {
    pub base_radius: f32,
    pub radius_step: f32,
}

impl Default for SpiralConfig {
    fn default() -> Self {
        Self {
            base_radius: 120.0,
            radius_step: 18.0,
        }
    }
}

/// Position of the `index`-th item, before jitter
pub fn spiral_position(anchor: Pos2, index: usize, config: &SpiralConfig) -> Pos2 {
    let n = index as f32;
    let angle = (n * GOLDEN_ANGLE_DEG).to_radians();
    let radius = config.base_radius + n * config.radius_step;
    anchor + Vec2::new(angle.cos(), angle.sin()) * radius
}
