//! Interactive canvas: pan, zoom, node drag, selection and context menu

pub mod input;

pub use input::{CanvasEngine, ContextMenu, DragCommit, InteractionState, PointerUp, DRAG_THRESHOLD};
