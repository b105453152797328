//! Property tests over random op sequences on generated quest graphs

use emath::{Pos2, Vec2};
use proptest::prelude::*;

use quest_map::geometry::Viewport;
use quest_map::layout::{LayoutAssigner, Suggestion};
use quest_map::model::NodePatch;
use quest_map::{reduce, EdgeType, GraphOp, NodeStatus, NodeType, QuestGraph, QuestNode};

fn generated(count: usize) -> QuestGraph {
    let suggestions = (0..count).map(|i| Suggestion::titled(format!("step {}", i))).collect();
    let delta = LayoutAssigner::default().generate(&QuestGraph::new(), "goal", "now", suggestions);
    reduce(QuestGraph::new(), GraphOp::Merge(delta))
}

fn pick(graph: &QuestGraph, index: usize) -> Option<String> {
    let ids: Vec<&QuestNode> = graph.nodes().collect();
    if ids.is_empty() {
        return None;
    }
    Some(ids[index % ids.len()].id.clone())
}

/// Build one op against the current graph
fn op_for(graph: &QuestGraph, kind: u8, index: usize, x: f32, y: f32) -> Option<GraphOp> {
    let id = pick(graph, index)?;
    let assigner = LayoutAssigner::default();
    let op = match kind {
        0 => GraphOp::CompleteNode { id },
        1 => GraphOp::SetPosition {
            id,
            position: Pos2::new(x, y),
        },
        2 => GraphOp::RemoveNode { id },
        3 => GraphOp::Merge(
            assigner
                .breakdown(graph, &id, vec![Suggestion::titled("sub")])
                .ok()?,
        ),
        4 => GraphOp::Merge(
            assigner
                .expand(graph, &id, vec![Suggestion::titled("alt")])
                .ok()?,
        ),
        5 => GraphOp::UpdateNode {
            id,
            patch: NodePatch {
                status: Some(NodeStatus::InProgress),
                ..NodePatch::default()
            },
        },
        _ => GraphOp::Merge(assigner.generate(graph, "goal", "now", vec![Suggestion::titled("more")])),
    };
    Some(op)
}

fn ops() -> impl Strategy<Value = Vec<(u8, usize, f32, f32)>> {
    prop::collection::vec((0u8..7, 0usize..64, -500.0f32..1500.0, -500.0f32..1500.0), 0..24)
}

fn run(mut graph: QuestGraph, script: &[(u8, usize, f32, f32)]) -> QuestGraph {
    for &(kind, index, x, y) in script {
        if let Some(op) = op_for(&graph, kind, index, x, y) {
            graph = reduce(graph, op);
        }
    }
    graph
}

proptest! {
    #[test]
    fn edges_always_resolve(count in 1usize..10, script in ops()) {
        let graph = run(generated(count), &script);

        prop_assert!(graph.is_closed());
        for edge in graph.edges() {
            prop_assert!(graph.node(&edge.source_id).is_some());
            prop_assert!(graph.node(&edge.target_id).is_some());
        }
        prop_assert!(graph.nodes_of_type(NodeType::Current).count() <= 1);
        prop_assert!(graph.nodes_of_type(NodeType::Goal).count() <= 1);
    }

    #[test]
    fn completed_nodes_only_have_solid_edges(count in 1usize..10, script in ops()) {
        let graph = run(generated(count), &script);

        for node in graph.nodes().filter(|n| n.is_completed()) {
            prop_assert!(graph.outgoing(&node.id).all(|e| e.edge_type == EdgeType::Solid));
        }
    }

    #[test]
    fn completion_is_idempotent(count in 1usize..10, script in ops(), index in 0usize..64) {
        let graph = run(generated(count), &script);
        let Some(id) = pick(&graph, index) else { return Ok(()); };

        let once = reduce(graph, GraphOp::CompleteNode { id: id.clone() });
        let twice = reduce(once.clone(), GraphOp::CompleteNode { id });
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn completion_unlocks_direct_successors_only(count in 3usize..10, script in ops(), index in 0usize..64) {
        let graph = run(generated(count), &script);
        let Some(id) = pick(&graph, index) else { return Ok(()); };
        if graph.node(&id).map(|n| n.status) == Some(NodeStatus::Locked) {
            return Ok(());
        }

        let successors: Vec<String> = graph.outgoing(&id).map(|e| e.target_id.clone()).collect();
        let after = reduce(graph.clone(), GraphOp::CompleteNode { id: id.clone() });

        prop_assert_eq!(after.node(&id).map(|n| n.status), Some(NodeStatus::Completed));
        for node in graph.nodes() {
            let now = after.node(&node.id).map(|n| n.status);
            if node.id == id {
                continue;
            }
            if successors.contains(&node.id) && node.status == NodeStatus::Locked {
                prop_assert_eq!(now, Some(NodeStatus::NotStarted));
            } else {
                prop_assert_eq!(now, Some(node.status));
            }
        }
    }

    #[test]
    fn removed_ids_are_never_reused(count in 1usize..10, index in 0usize..64) {
        let graph = generated(count);
        let Some(id) = pick(&graph, index) else { return Ok(()); };
        let removed = graph.node(&id).cloned();

        let graph = reduce(graph, GraphOp::RemoveNode { id: id.clone() });
        let graph = reduce(graph, GraphOp::AddNodes(removed.into_iter().collect()));
        prop_assert!(graph.node(&id).is_none());
    }

    #[test]
    fn anchors_never_move(count in 1usize..10, x in -500.0f32..1500.0, y in -500.0f32..1500.0) {
        let graph = generated(count);
        let current = graph.anchor(NodeType::Current).cloned();
        let Some(current) = current else { return Ok(()); };

        let moved = reduce(graph, GraphOp::SetPosition { id: current.id.clone(), position: Pos2::new(x, y) });
        prop_assert_eq!(moved.node(&current.id).map(|n| n.position), Some(current.position));
    }

    #[test]
    fn viewport_round_trips(px in -2000.0f32..2000.0, py in -2000.0f32..2000.0, zoom in 0.1f32..5.0, sx in 0.0f32..1920.0, sy in 0.0f32..1080.0) {
        let viewport = Viewport::new(Vec2::new(px, py), zoom);
        prop_assert!(viewport.zoom() >= 0.35 && viewport.zoom() <= 2.2);

        let screen = Pos2::new(sx, sy);
        let back = viewport.map_to_screen(viewport.screen_to_map(screen));
        prop_assert!((back - screen).length() < 1e-2);
    }
}
