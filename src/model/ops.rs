//! Graph operations as values
//!
//! `reduce` is the pure `(graph, op) -> graph'` entry point. `GraphEngine`
//! owns the graph of one quest session and applies ops to it, keeping the
//! quest identity alongside.

use emath::Pos2;
use tracing::{debug, warn};

use super::graph::{Completion, QuestGraph, Revert};
use super::types::*;
use crate::error::GraphError;

/// A local graph mutation
#[derive(Debug, Clone, PartialEq)]
pub enum GraphOp {
    AddNodes(Vec<QuestNode>),
    AddEdges(Vec<QuestEdge>),
    Merge(GraphDelta),
    UpdateNode { id: String, patch: NodePatch },
    CompleteNode { id: String },
    SetPosition { id: String, position: Pos2 },
    ConfirmNode { id: String, server_id: ServerId },
    RemoveNode { id: String },
    /// Put back fields a failed command wrote (rollback)
    Revert(Vec<Revert>),
}

impl GraphOp {
    pub fn name(&self) -> &'static str {
        match self {
            GraphOp::AddNodes(_) => "add_nodes",
            GraphOp::AddEdges(_) => "add_edges",
            GraphOp::Merge(_) => "merge",
            GraphOp::UpdateNode { .. } => "update_node",
            GraphOp::CompleteNode { .. } => "complete_node",
            GraphOp::SetPosition { .. } => "set_position",
            GraphOp::ConfirmNode { .. } => "confirm_node",
            GraphOp::RemoveNode { .. } => "remove_node",
            GraphOp::Revert(_) => "revert",
        }
    }
}

/// Apply `op` to `graph` and return the new graph.
///
/// Rejected ops (locked transitions, anchor moves) leave the graph as it was.
pub fn reduce(mut graph: QuestGraph, op: GraphOp) -> QuestGraph {
    let name = op.name();
    if let Err(err) = apply(&mut graph, op) {
        warn!(op = name, error = %err, "graph op rejected");
    }
    graph
}

/// In-place form of `reduce` that reports rejections
pub fn apply(graph: &mut QuestGraph, op: GraphOp) -> Result<bool, GraphError> {
    let changed = match op {
        GraphOp::AddNodes(nodes) => graph.add_nodes(nodes) > 0,
        GraphOp::AddEdges(edges) => graph.add_edges(edges) > 0,
        GraphOp::Merge(delta) => {
            let (nodes, edges) = graph.merge(delta);
            nodes + edges > 0
        }
        GraphOp::UpdateNode { id, patch } => graph.update_node(&id, &patch)?,
        GraphOp::CompleteNode { id } => graph
            .complete_node(&id)?
            .map(|c| c.changed())
            .unwrap_or(false),
        GraphOp::SetPosition { id, position } => graph.set_position(&id, position)?,
        GraphOp::ConfirmNode { id, server_id } => graph.confirm_node(&id, server_id),
        GraphOp::RemoveNode { id } => graph.remove_node(&id).is_some(),
        GraphOp::Revert(reverts) => graph.revert(reverts) > 0,
    };
    Ok(changed)
}

// =============================================================================
// ENGINE
// =============================================================================

/// Graph state for one quest session
#[derive(Debug, Clone, Default)]
pub struct GraphEngine {
    quest_id: Option<String>,
    goal: String,
    current_situation: String,
    graph: QuestGraph,
    /// Bumped on every effective change; observers compare against it
    revision: u64,
}

impl GraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session for a quest that has no graph yet
    pub fn for_quest(quest_id: impl Into<String>, goal: impl Into<String>, situation: impl Into<String>) -> Self {
        Self {
            quest_id: Some(quest_id.into()),
            goal: goal.into(),
            current_situation: situation.into(),
            ..Self::default()
        }
    }

    /// Rehydrate a session from a backend quest
    pub fn from_quest(quest: Quest) -> Self {
        let graph = QuestGraph::from_parts(quest.nodes, quest.edges);
        debug!(quest_id = %quest.id, nodes = graph.node_count(), edges = graph.edge_count(), "rehydrated quest");
        Self {
            quest_id: Some(quest.id),
            goal: quest.goal,
            current_situation: quest.current_situation,
            graph,
            revision: 1,
        }
    }

    pub fn quest_id(&self) -> Option<&str> {
        self.quest_id.as_deref()
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn current_situation(&self) -> &str {
        &self.current_situation
    }

    pub fn set_current_situation(&mut self, situation: impl Into<String>) {
        self.current_situation = situation.into();
    }

    pub fn graph(&self) -> &QuestGraph {
        &self.graph
    }

    /// Mutable access for the canvas drag path, which moves nodes at pointer
    /// frequency. Call `mark_changed` after an effective change.
    pub fn graph_mut(&mut self) -> &mut QuestGraph {
        &mut self.graph
    }

    pub fn mark_changed(&mut self) {
        self.revision += 1;
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply one op; returns whether the graph changed
    pub fn apply(&mut self, op: GraphOp) -> Result<bool, GraphError> {
        let changed = apply(&mut self.graph, op)?;
        if changed {
            self.revision += 1;
        }
        Ok(changed)
    }

    /// Completion with its effect report
    pub fn complete(&mut self, id: &str) -> Result<Completion, GraphError> {
        let completion = self
            .graph
            .complete_node(id)?
            .ok_or_else(|| GraphError::UnknownNode { id: id.to_string() })?;
        if completion.changed() {
            self.revision += 1;
        }
        Ok(completion)
    }

    /// Partial update with the reverts that undo it
    pub fn update(&mut self, id: &str, patch: &NodePatch) -> Result<Vec<Revert>, GraphError> {
        let reverts = self.graph.patch_node(id, patch)?;
        if !reverts.is_empty() {
            self.revision += 1;
        }
        Ok(reverts)
    }

    /// Export the session as a wire quest
    pub fn to_quest(&self) -> Option<Quest> {
        let id = self.quest_id.clone()?;
        let (nodes, edges) = self.graph.to_parts();
        let created_at = nodes.iter().map(|n| n.created_at).min().unwrap_or_else(chrono::Utc::now);
        let updated_at = nodes.iter().map(|n| n.updated_at).max().unwrap_or(created_at);
        Some(Quest {
            id,
            goal: self.goal.clone(),
            current_situation: self.current_situation.clone(),
            nodes,
            edges,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: &str) -> QuestNode {
        QuestNode::new(id, id, NodeType::Choice, NodeStatus::NotStarted, Pos2::ZERO)
    }

    #[test]
    fn test_reduce_is_pure_over_value() {
        let g0 = QuestGraph::new();
        let g1 = reduce(g0.clone(), GraphOp::AddNodes(vec![choice("a")]));
        assert!(g0.is_empty());
        assert_eq!(g1.node_count(), 1);
    }

    #[test]
    fn test_reduce_rejected_op_keeps_graph() {
        let anchor = QuestNode::new("c", "now", NodeType::Current, NodeStatus::InProgress, Pos2::ZERO);
        let g = QuestGraph::from_parts(vec![anchor], vec![]);
        let moved = reduce(
            g.clone(),
            GraphOp::SetPosition {
                id: "c".into(),
                position: Pos2::new(9.0, 9.0),
            },
        );
        assert_eq!(moved, g);
    }

    #[test]
    fn test_engine_revision_tracks_changes() {
        let mut engine = GraphEngine::for_quest("q1", "goal", "now");
        assert_eq!(engine.apply(GraphOp::AddNodes(vec![choice("a")])), Ok(true));
        let rev = engine.revision();
        assert_eq!(engine.apply(GraphOp::AddNodes(vec![choice("a")])), Ok(false));
        assert_eq!(engine.revision(), rev);
    }

    #[test]
    fn test_engine_complete_unknown() {
        let mut engine = GraphEngine::new();
        assert!(matches!(engine.complete("x"), Err(GraphError::UnknownNode { .. })));
    }

    #[test]
    fn test_engine_update_reports_reverts() {
        let mut engine = GraphEngine::for_quest("q1", "goal", "now");
        engine.apply(GraphOp::AddNodes(vec![choice("a")])).unwrap();
        let rev = engine.revision();
        let patch = NodePatch {
            title: Some("renamed".into()),
            ..NodePatch::default()
        };

        let reverts = engine.update("a", &patch).unwrap();
        assert_eq!(reverts.len(), 1);
        assert_eq!(engine.revision(), rev + 1);

        assert_eq!(engine.apply(GraphOp::Revert(reverts)), Ok(true));
        assert_eq!(engine.graph().node("a").unwrap().title, "a");
    }

    #[test]
    fn test_to_quest_requires_id() {
        assert!(GraphEngine::new().to_quest().is_none());
        let engine = GraphEngine::for_quest("q1", "goal", "now");
        assert_eq!(engine.to_quest().unwrap().goal, "goal");
    }
}
