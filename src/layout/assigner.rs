//! Layout algorithm - deterministic placement of AI-generated nodes
//!
//! Anchors sit at fixed map coordinates. A bulk generate stacks the first
//! suggestions as CHOICE nodes between the anchors and the rest as LOCKED
//! FUTURE nodes two per row further right. Breakdown children go to the
//! right of their parent; expand alternatives go below the original and
//! inherit its outgoing edges as speculative paths.

use emath::{Pos2, Vec2};
use tracing::debug;

use crate::error::GraphError;
use crate::model::*;

// =============================================================================
// LAYOUT CONSTANTS
// =============================================================================

/// Row pitch shared by every stacked tier
pub const ROW_HEIGHT: f32 = 120.0;

/// Number of suggestions that become CHOICE nodes in a bulk generate
pub const CHOICE_SLOTS: usize = 3;

pub const CHOICE_TO_FUTURE_WEIGHT: f32 = 0.5;
pub const FUTURE_TO_GOAL_WEIGHT: f32 = 0.3;
pub const ALTERNATIVE_WEIGHT: f32 = 0.7;

/// Placement parameters
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub current_anchor: Pos2,
    pub goal_anchor: Pos2,
    pub choice_x: f32,
    pub choice_base_y: f32,
    pub future_x: f32,
    pub future_base_y: f32,
    /// Horizontal distance between the two FUTURE columns
    pub future_column_gap: f32,
    pub row_height: f32,
    /// Horizontal offset of breakdown children from their parent
    pub breakdown_dx: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            current_anchor: Pos2::new(100.0, 400.0),
            goal_anchor: Pos2::new(900.0, 150.0),
            choice_x: 380.0,
            choice_base_y: 250.0,
            future_x: 640.0,
            future_base_y: 300.0,
            future_column_gap: 170.0,
            row_height: ROW_HEIGHT,
            breakdown_dx: 280.0,
        }
    }
}

/// Priority tag the AI attaches to a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One AI suggestion, already validated at the sync boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    /// Expected outcome, rationale or AI remark shown with the node
    pub note: Option<String>,
}

impl Suggestion {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category: None,
            priority: None,
            note: None,
        }
    }

    fn into_node(self, node_type: NodeType, status: NodeStatus, position: Pos2) -> QuestNode {
        let recommended = self.priority == Some(Priority::High);
        let mut node = QuestNode::local(self.title, node_type, status, position)
            .with_description(self.description)
            .with_category(self.category);
        if recommended {
            node = node.with_recommended(true);
        }
        node.ai_comment = self.note;
        node
    }
}

// =============================================================================
// ASSIGNER
// =============================================================================

/// Turns AI suggestions into positioned nodes and edges
#[derive(Debug, Clone, Default)]
pub struct LayoutAssigner {
    config: LayoutConfig,
}

impl LayoutAssigner {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Bulk generate. Creates the CURRENT/GOAL anchors if the quest has none,
    /// then CHOICE and FUTURE tiers wired CURRENT→CHOICE→FUTURE→GOAL.
    ///
    /// Repeated generates reuse the anchors and continue the stacks below
    /// what is already there.
    pub fn generate(
        &self,
        graph: &QuestGraph,
        goal: &str,
        situation: &str,
        suggestions: Vec<Suggestion>,
    ) -> GraphDelta {
        let mut delta = GraphDelta::default();

        let current_id = match graph.anchor(NodeType::Current) {
            Some(node) => node.id.clone(),
            None => {
                let node = QuestNode::local(situation, NodeType::Current, NodeStatus::InProgress, self.config.current_anchor);
                let id = node.id.clone();
                delta.nodes.push(node);
                id
            }
        };
        let goal_id = match graph.anchor(NodeType::Goal) {
            Some(node) => node.id.clone(),
            None => {
                let node = QuestNode::local(goal, NodeType::Goal, NodeStatus::NotStarted, self.config.goal_anchor);
                let id = node.id.clone();
                delta.nodes.push(node);
                id
            }
        };

        let choice_offset = graph
            .nodes_of_type(NodeType::Choice)
            .filter(|n| n.parent_id.is_none() && n.alternative_to_id.is_none())
            .count();
        let future_offset = graph.nodes_of_type(NodeType::Future).count();

        let mut choices = Vec::new();
        let mut futures = Vec::new();
        for (index, suggestion) in suggestions.into_iter().enumerate() {
            if index < CHOICE_SLOTS {
                let row = (choice_offset + index) as f32;
                let position = Pos2::new(self.config.choice_x, self.config.choice_base_y + row * self.config.row_height);
                choices.push(suggestion.into_node(NodeType::Choice, NodeStatus::NotStarted, position));
            } else {
                let slot = future_offset + (index - CHOICE_SLOTS);
                let column = (slot % 2) as f32;
                let row = (slot / 2) as f32;
                let position = Pos2::new(
                    self.config.future_x + column * self.config.future_column_gap,
                    self.config.future_base_y + row * self.config.row_height,
                );
                futures.push(suggestion.into_node(NodeType::Future, NodeStatus::Locked, position));
            }
        }

        for choice in &choices {
            delta.edges.push(QuestEdge::solid(&current_id, &choice.id));
        }
        for (choice, future) in choices.iter().zip(futures.iter()) {
            delta
                .edges
                .push(QuestEdge::dotted(&choice.id, &future.id, CHOICE_TO_FUTURE_WEIGHT));
        }
        for future in &futures {
            delta
                .edges
                .push(QuestEdge::dotted(&future.id, &goal_id, FUTURE_TO_GOAL_WEIGHT));
        }

        debug!(choices = choices.len(), futures = futures.len(), edges = delta.edges.len(), "generate layout");
        delta.nodes.extend(choices);
        delta.nodes.extend(futures);
        delta
    }

    /// Sub-tasks of `parent_id` as CHOICE nodes to its right, linked by SOLID
    /// edges. The parent and its existing edges are untouched.
    pub fn breakdown(
        &self,
        graph: &QuestGraph,
        parent_id: &str,
        subtasks: Vec<Suggestion>,
    ) -> Result<GraphDelta, GraphError> {
        let parent = graph
            .node(parent_id)
            .ok_or_else(|| GraphError::UnknownNode { id: parent_id.to_string() })?;
        let existing = graph
            .nodes()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .count();

        let mut delta = GraphDelta::default();
        for (index, subtask) in subtasks.into_iter().enumerate() {
            let row = (existing + index) as f32;
            let position = parent.position + Vec2::new(self.config.breakdown_dx, row * self.config.row_height);
            let child = subtask
                .into_node(NodeType::Choice, NodeStatus::NotStarted, position)
                .with_parent(parent_id);
            delta.edges.push(QuestEdge::solid(parent_id, &child.id));
            delta.nodes.push(child);
        }
        debug!(parent_id = %parent_id, children = delta.nodes.len(), "breakdown layout");
        Ok(delta)
    }

    /// Alternatives to `original_id` stacked below it. Each alternative gets a
    /// DOTTED copy (weight 0.7) of every outgoing edge of the original.
    pub fn expand(
        &self,
        graph: &QuestGraph,
        original_id: &str,
        alternatives: Vec<Suggestion>,
    ) -> Result<GraphDelta, GraphError> {
        let original = graph
            .node(original_id)
            .ok_or_else(|| GraphError::UnknownNode { id: original_id.to_string() })?;
        let existing = graph
            .nodes()
            .filter(|n| n.alternative_to_id.as_deref() == Some(original_id))
            .count();
        let targets: Vec<&QuestEdge> = graph.outgoing(original_id).collect();

        let mut delta = GraphDelta::default();
        for (index, alternative) in alternatives.into_iter().enumerate() {
            let row = (existing + index + 1) as f32;
            let position = original.position + Vec2::new(0.0, row * self.config.row_height);
            let node = alternative
                .into_node(NodeType::Choice, NodeStatus::NotStarted, position)
                .with_alternative_to(original_id);
            for edge in &targets {
                let mut inherited = QuestEdge::dotted(&node.id, &edge.target_id, ALTERNATIVE_WEIGHT);
                inherited.label = edge.label.clone();
                delta.edges.push(inherited);
            }
            delta.nodes.push(node);
        }
        debug!(original_id = %original_id, alternatives = delta.nodes.len(), "expand layout");
        Ok(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestions(n: usize) -> Vec<Suggestion> {
        (0..n).map(|i| Suggestion::titled(format!("step {}", i))).collect()
    }

    #[test]
    fn test_generate_positions() {
        let assigner = LayoutAssigner::default();
        let delta = assigner.generate(&QuestGraph::new(), "goal", "now", suggestions(5));

        let current = delta.nodes.iter().find(|n| n.node_type == NodeType::Current).unwrap();
        assert_eq!(current.position, Pos2::new(100.0, 400.0));
        let choices: Vec<_> = delta.nodes.iter().filter(|n| n.node_type == NodeType::Choice).collect();
        assert_eq!(choices[2].position, Pos2::new(380.0, 490.0));
        let futures: Vec<_> = delta.nodes.iter().filter(|n| n.node_type == NodeType::Future).collect();
        assert_eq!(futures[0].position, Pos2::new(640.0, 300.0));
        assert_eq!(futures[1].position, Pos2::new(810.0, 300.0));
        assert!(futures.iter().all(|f| f.status == NodeStatus::Locked));
    }

    #[test]
    fn test_generate_reuses_anchors() {
        let assigner = LayoutAssigner::default();
        let mut graph = QuestGraph::new();
        graph.merge(assigner.generate(&graph, "goal", "now", suggestions(2)));
        let again = assigner.generate(&graph, "goal", "now", suggestions(1));
        assert!(again.nodes.iter().all(|n| !n.node_type.is_anchor()));
        // continues the CHOICE stack
        assert_eq!(again.nodes[0].position.y, 250.0 + 2.0 * ROW_HEIGHT);
    }

    #[test]
    fn test_high_priority_is_recommended() {
        let mut s = Suggestion::titled("a");
        s.priority = Some(Priority::High);
        let delta = LayoutAssigner::default().generate(&QuestGraph::new(), "g", "c", vec![s]);
        let choice = delta.nodes.iter().find(|n| n.node_type == NodeType::Choice).unwrap();
        assert_eq!(choice.is_recommended, Some(true));
    }

    #[test]
    fn test_breakdown_unknown_parent() {
        let result = LayoutAssigner::default().breakdown(&QuestGraph::new(), "ghost", suggestions(1));
        assert!(matches!(result, Err(GraphError::UnknownNode { .. })));
    }

    #[test]
    fn test_breakdown_offsets_right_of_parent() {
        let parent = QuestNode::new("p", "p", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(380.0, 250.0));
        let graph = QuestGraph::from_parts(vec![parent], vec![]);
        let delta = LayoutAssigner::default().breakdown(&graph, "p", suggestions(2)).unwrap();
        assert_eq!(delta.nodes[0].position, Pos2::new(660.0, 250.0));
        assert_eq!(delta.nodes[1].position, Pos2::new(660.0, 370.0));
        assert!(delta.edges.iter().all(|e| e.source_id == "p" && e.edge_type == EdgeType::Solid));
        assert_eq!(delta.nodes[0].parent_id.as_deref(), Some("p"));
    }

    #[test]
    fn test_expand_places_below_original() {
        let original = QuestNode::new("o", "o", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(380.0, 250.0));
        let graph = QuestGraph::from_parts(vec![original], vec![]);
        let delta = LayoutAssigner::default().expand(&graph, "o", suggestions(1)).unwrap();
        assert_eq!(delta.nodes[0].position, Pos2::new(380.0, 370.0));
        assert!(delta.edges.is_empty());
    }
}
