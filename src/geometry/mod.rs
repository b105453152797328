//! Pure geometry: transforms, node boxes, edge curves, radial placement and
//! hit-testing

pub mod bounds;
pub mod edges;
pub mod spatial;
pub mod spiral;
pub mod transform;

pub use bounds::{node_rect, node_size, source_anchor, target_anchor};
pub use edges::EdgePath;
pub use spatial::{SpatialIndex, SpatialNode};
pub use spiral::{spiral_position, SpiralConfig, GOLDEN_ANGLE_DEG};
pub use transform::{ViewState, Viewport, MAX_ZOOM, MIN_ZOOM, ZOOM_STEP};
