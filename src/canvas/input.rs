//! Pointer/wheel input state machine
//!
//! ```text
//!            pointer-down on CHOICE/FUTURE
//!   Idle ─────────────────────────────────► DraggingNode(id, grab offset)
//!    │  ▲                                        │
//!    │  └──────────── pointer-up / leave ◄───────┘
//!    │  ▲
//!    │  └──────────── pointer-up / leave ◄───────┐
//!    └───────────────────────────────────► Panning(start pan, start pointer)
//!            pointer-down anywhere else (anchors included)
//! ```
//!
//! Handling is synchronous per event. Drags write the node position into
//! the graph on every move; the final position is handed back on release so
//! the caller can push it through the position-sync path.

use emath::{Pos2, Vec2};
use tracing::{debug, warn};

use crate::geometry::{SpatialIndex, ViewState, Viewport};
use crate::model::QuestGraph;

/// Screen distance under which a press/release pair counts as a click
pub const DRAG_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Panning {
        start_pan: Vec2,
        pointer_start: Pos2,
    },
    DraggingNode {
        node_id: String,
        /// Pointer minus node origin, in map units
        grab_offset: Vec2,
        pointer_start: Pos2,
        moved: bool,
    },
}

/// Contextual menu anchored on a node
#[derive(Debug, Clone, PartialEq)]
pub struct ContextMenu {
    pub node_id: String,
    pub screen: Pos2,
}

/// Final position of a drag, to be committed remotely
#[derive(Debug, Clone, PartialEq)]
pub struct DragCommit {
    pub node_id: String,
    pub position: Pos2,
}

/// What a pointer release resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum PointerUp {
    None,
    DragCommitted(DragCommit),
    Selected(String),
    PanEnded,
}

/// Canvas interaction engine for one map view
#[derive(Debug, Clone)]
pub struct CanvasEngine {
    viewport: Viewport,
    size: Vec2,
    state: InteractionState,
    selection: Option<String>,
    context_menu: Option<ContextMenu>,
}

impl Default for CanvasEngine {
    fn default() -> Self {
        Self::new(Vec2::new(1280.0, 800.0))
    }
}

impl CanvasEngine {
    pub fn new(size: Vec2) -> Self {
        Self {
            viewport: Viewport::default(),
            size,
            state: InteractionState::Idle,
            selection: None,
            context_menu: None,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn context_menu(&self) -> Option<&ContextMenu> {
        self.context_menu.as_ref()
    }

    pub fn zoom(&self) -> f32 {
        self.viewport.zoom()
    }

    pub fn screen_to_map(&self, screen: Pos2) -> Pos2 {
        self.viewport.screen_to_map(screen)
    }

    pub fn map_to_screen(&self, map: Pos2) -> Pos2 {
        self.viewport.map_to_screen(map)
    }

    /// Node id under a screen point, if any (topmost in render order)
    pub fn hit_test(&self, screen: Pos2, graph: &QuestGraph) -> Option<String> {
        let index = SpatialIndex::from_graph(graph);
        index
            .hit_test(self.screen_to_map(screen))
            .map(|node| node.id.clone())
    }

    // =========================================================================
    // POINTER EVENTS
    // =========================================================================

    pub fn pointer_down(&mut self, screen: Pos2, graph: &QuestGraph) -> &InteractionState {
        self.context_menu = None;
        self.selection = None;

        let map = self.screen_to_map(screen);
        let index = SpatialIndex::from_graph(graph);
        let draggable = index
            .hit_test(map)
            .filter(|hit| hit.node_type.is_draggable())
            .and_then(|hit| graph.node(&hit.id));

        self.state = match draggable {
            Some(node) => {
                debug!(node_id = %node.id, "drag start");
                InteractionState::DraggingNode {
                    node_id: node.id.clone(),
                    grab_offset: map - node.position,
                    pointer_start: screen,
                    moved: false,
                }
            }
            None => InteractionState::Panning {
                start_pan: self.viewport.pan,
                pointer_start: screen,
            },
        };
        &self.state
    }

    /// Returns the node's new position while dragging
    pub fn pointer_move(&mut self, screen: Pos2, graph: &mut QuestGraph) -> Option<Pos2> {
        match &mut self.state {
            InteractionState::Idle => None,
            InteractionState::Panning {
                start_pan,
                pointer_start,
            } => {
                self.viewport.pan = *start_pan + (screen - *pointer_start);
                None
            }
            InteractionState::DraggingNode {
                node_id,
                grab_offset,
                pointer_start,
                moved,
            } => {
                if !*moved && (screen - *pointer_start).length() < DRAG_THRESHOLD {
                    return None;
                }
                *moved = true;
                let position = self.viewport.screen_to_map(screen) - *grab_offset;
                match graph.set_position(node_id, position) {
                    Ok(true) => Some(position),
                    // node gone or already there
                    Ok(false) => None,
                    Err(err) => {
                        warn!(node_id = %node_id, error = %err, "drag move rejected");
                        None
                    }
                }
            }
        }
    }

    /// Pointer released or left the canvas; always returns to `Idle`
    pub fn pointer_up(&mut self, graph: &QuestGraph) -> PointerUp {
        match std::mem::take(&mut self.state) {
            InteractionState::Idle => PointerUp::None,
            InteractionState::Panning { start_pan, .. } => {
                if start_pan == self.viewport.pan {
                    PointerUp::None
                } else {
                    PointerUp::PanEnded
                }
            }
            InteractionState::DraggingNode { node_id, moved, .. } => {
                if !moved {
                    self.selection = Some(node_id.clone());
                    return PointerUp::Selected(node_id);
                }
                match graph.node(&node_id) {
                    Some(node) => {
                        debug!(node_id = %node_id, x = node.position.x, y = node.position.y, "drag end");
                        PointerUp::DragCommitted(DragCommit {
                            position: node.position,
                            node_id,
                        })
                    }
                    None => PointerUp::None,
                }
            }
        }
    }

    pub fn pointer_leave(&mut self, graph: &QuestGraph) -> PointerUp {
        self.pointer_up(graph)
    }

    /// One wheel tick, zoom anchored at the canvas origin
    pub fn wheel(&mut self, delta_y: f32) -> f32 {
        self.viewport.wheel(delta_y);
        self.viewport.zoom()
    }

    // =========================================================================
    // SELECTION / MENU / VIEW
    // =========================================================================

    /// Open the contextual menu on whatever node is under `screen`
    /// (anchors included)
    pub fn open_context_menu(&mut self, screen: Pos2, graph: &QuestGraph) -> Option<&ContextMenu> {
        self.context_menu = self
            .hit_test(screen, graph)
            .map(|node_id| ContextMenu { node_id, screen });
        self.context_menu.as_ref()
    }

    pub fn close_context_menu(&mut self) {
        self.context_menu = None;
    }

    pub fn select(&mut self, node_id: Option<String>) {
        self.selection = node_id;
    }

    pub fn resize(&mut self, size: Vec2) {
        if size.x > 0.0 && size.y > 0.0 {
            self.size = size;
        }
    }

    pub fn view_state(&self) -> ViewState {
        self.viewport.to_view_state(self.size)
    }

    pub fn restore_view_state(&mut self, state: &ViewState) {
        self.viewport = Viewport::from_view_state(state, self.size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeStatus, NodeType, QuestNode};

    fn graph() -> QuestGraph {
        QuestGraph::from_parts(
            vec![
                QuestNode::new("cur", "now", NodeType::Current, NodeStatus::InProgress, Pos2::new(100.0, 400.0)),
                QuestNode::new("c1", "choice", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(380.0, 250.0)),
            ],
            vec![],
        )
    }

    #[test]
    fn test_press_on_choice_starts_drag() {
        let g = graph();
        let mut canvas = CanvasEngine::default();
        let state = canvas.pointer_down(Pos2::new(400.0, 260.0), &g);
        match state {
            InteractionState::DraggingNode { node_id, grab_offset, .. } => {
                assert_eq!(node_id, "c1");
                assert_eq!(*grab_offset, Vec2::new(20.0, 10.0));
            }
            other => panic!("expected drag, got {:?}", other),
        }
    }

    #[test]
    fn test_press_on_anchor_pans() {
        let g = graph();
        let mut canvas = CanvasEngine::default();
        assert!(matches!(
            canvas.pointer_down(Pos2::new(120.0, 420.0), &g),
            InteractionState::Panning { .. }
        ));
    }

    #[test]
    fn test_drag_updates_live_and_commits() {
        let mut g = graph();
        let mut canvas = CanvasEngine::default();
        canvas.pointer_down(Pos2::new(400.0, 260.0), &g);
        assert_eq!(canvas.pointer_move(Pos2::new(450.0, 300.0), &mut g), Some(Pos2::new(430.0, 290.0)));
        assert_eq!(g.node("c1").unwrap().position, Pos2::new(430.0, 290.0));
        canvas.pointer_move(Pos2::new(500.0, 300.0), &mut g);

        let up = canvas.pointer_up(&g);
        assert_eq!(
            up,
            PointerUp::DragCommitted(DragCommit {
                node_id: "c1".into(),
                position: Pos2::new(480.0, 290.0),
            })
        );
        assert_eq!(canvas.state(), &InteractionState::Idle);
    }

    #[test]
    fn test_drag_of_removed_node_reports_no_move() {
        let mut g = graph();
        let mut canvas = CanvasEngine::default();
        canvas.pointer_down(Pos2::new(400.0, 260.0), &g);
        g.remove_node("c1");

        assert_eq!(canvas.pointer_move(Pos2::new(450.0, 300.0), &mut g), None);
        assert!(matches!(canvas.state(), InteractionState::DraggingNode { .. }));
    }

    #[test]
    fn test_click_selects() {
        let g = graph();
        let mut canvas = CanvasEngine::default();
        canvas.pointer_down(Pos2::new(400.0, 260.0), &g);
        assert_eq!(canvas.pointer_up(&g), PointerUp::Selected("c1".into()));
        assert_eq!(canvas.selection(), Some("c1"));

        // next press clears it
        canvas.pointer_down(Pos2::new(0.0, 0.0), &g);
        assert_eq!(canvas.selection(), None);
    }

    #[test]
    fn test_pan_follows_pointer() {
        let mut g = graph();
        let mut canvas = CanvasEngine::default();
        canvas.pointer_down(Pos2::new(10.0, 10.0), &g);
        canvas.pointer_move(Pos2::new(40.0, -5.0), &mut g);
        assert_eq!(canvas.viewport().pan, Vec2::new(30.0, -15.0));
        assert_eq!(canvas.pointer_leave(&g), PointerUp::PanEnded);
    }

    #[test]
    fn test_drag_respects_zoom() {
        let mut g = graph();
        let mut canvas = CanvasEngine::default();
        for _ in 0..5 {
            canvas.wheel(1.0);
        }
        let zoom = canvas.zoom();
        let grab = canvas.map_to_screen(Pos2::new(390.0, 260.0));
        canvas.pointer_down(grab, &g);
        canvas.pointer_move(grab + Vec2::new(zoom * 100.0, 0.0), &mut g);
        let pos = g.node("c1").unwrap().position;
        assert!((pos.x - 480.0).abs() < 1e-3);
        assert!((pos.y - 250.0).abs() < 1e-3);
    }

    #[test]
    fn test_context_menu_on_anchor_and_cleared_by_press() {
        let g = graph();
        let mut canvas = CanvasEngine::default();
        let menu = canvas.open_context_menu(Pos2::new(120.0, 420.0), &g).cloned();
        assert_eq!(menu.unwrap().node_id, "cur");
        canvas.pointer_down(Pos2::new(0.0, 0.0), &g);
        assert!(canvas.context_menu().is_none());
    }
}
