//! Edge paths - cubic bezier from source right-centre to target left-centre
//!
//! Control points sit horizontally on either side, offset by
//! `max(55, |dx| * 0.42)`, which gives an S-curve whatever the relative
//! placement of the two nodes (including targets to the left of the source).

use emath::{Pos2, Vec2};

use super::bounds::{source_anchor, target_anchor};
use crate::model::QuestNode;

const MIN_CONTROL_OFFSET: f32 = 55.0;
const CONTROL_RATIO: f32 = 0.42;

/// Cubic bezier through four control points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePath {
    pub from: Pos2,
    pub c1: Pos2,
    pub c2: Pos2,
    pub to: Pos2,
}

impl EdgePath {
    pub fn between_points(from: Pos2, to: Pos2) -> Self {
        let offset = control_offset(to.x - from.x);
        Self {
            from,
            c1: from + Vec2::new(offset, 0.0),
            c2: to - Vec2::new(offset, 0.0),
            to,
        }
    }

    pub fn between(source: &QuestNode, target: &QuestNode) -> Self {
        Self::between_points(source_anchor(source), target_anchor(target))
    }

    /// Point on the curve, `t` in `[0, 1]`
    pub fn point_at(&self, t: f32) -> Pos2 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        let v = self.from.to_vec2() * (u * u * u)
            + self.c1.to_vec2() * (3.0 * u * u * t)
            + self.c2.to_vec2() * (3.0 * u * t * t)
            + self.to.to_vec2() * (t * t * t);
        v.to_pos2()
    }

    /// SVG `d` attribute
    pub fn to_svg_path(&self) -> String {
        format!(
            "M {:.1} {:.1} C {:.1} {:.1}, {:.1} {:.1}, {:.1} {:.1}",
            self.from.x, self.from.y, self.c1.x, self.c1.y, self.c2.x, self.c2.y, self.to.x, self.to.y
        )
    }
}

pub fn control_offset(dx: f32) -> f32 {
    (dx.abs() * CONTROL_RATIO).max(MIN_CONTROL_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_edges_use_minimum_offset() {
        let path = EdgePath::between_points(Pos2::new(0.0, 0.0), Pos2::new(40.0, 100.0));
        assert_eq!(path.c1, Pos2::new(55.0, 0.0));
        assert_eq!(path.c2, Pos2::new(-15.0, 100.0));
    }

    #[test]
    fn test_long_edges_scale_offset() {
        let path = EdgePath::between_points(Pos2::new(0.0, 0.0), Pos2::new(-500.0, 0.0));
        assert_eq!(control_offset(-500.0), 210.0);
        assert_eq!(path.c1.x, 210.0);
        assert_eq!(path.c2.x, -710.0);
    }

    #[test]
    fn test_endpoints() {
        let path = EdgePath::between_points(Pos2::new(1.0, 2.0), Pos2::new(300.0, 40.0));
        assert_eq!(path.point_at(0.0), path.from);
        assert!((path.point_at(1.0) - path.to).length() < 1e-4);
        assert!(path.to_svg_path().starts_with("M 1.0 2.0 C"));
    }
}
