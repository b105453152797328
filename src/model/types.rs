//! Quest map data types
//!
//! Wire and in-memory shapes for nodes, edges and quests. Field names
//! serialise in camelCase and enum values in SCREAMING_SNAKE_CASE so the
//! same types round-trip through the backend and local storage.

use chrono::{DateTime, Utc};
use emath::Pos2;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// ENUMS
// =============================================================================

/// Role of a node on the quest map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Starting anchor (the user's current situation)
    Current,
    /// Actionable option
    Choice,
    /// Speculative step, initially locked
    Future,
    /// Target anchor
    Goal,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Current => "CURRENT",
            NodeType::Choice => "CHOICE",
            NodeType::Future => "FUTURE",
            NodeType::Goal => "GOAL",
        }
    }

    /// CURRENT and GOAL are fixed anchors of the map
    pub fn is_anchor(&self) -> bool {
        matches!(self, NodeType::Current | NodeType::Goal)
    }

    /// Only CHOICE and FUTURE nodes can be dragged on the canvas
    pub fn is_draggable(&self) -> bool {
        !self.is_anchor()
    }
}

/// Progress state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Locked,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::NotStarted => "NOT_STARTED",
            NodeStatus::InProgress => "IN_PROGRESS",
            NodeStatus::Completed => "COMPLETED",
            NodeStatus::Locked => "LOCKED",
        }
    }
}

/// Confirmed (solid) vs speculative (dotted) path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    Solid,
    Dotted,
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Numeric id assigned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub u64);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a node came from.
///
/// Local nodes exist only in this session until the backend confirms them;
/// only confirmed nodes have their positions pushed to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeOrigin {
    #[default]
    Local,
    Confirmed(ServerId),
}

impl NodeOrigin {
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            NodeOrigin::Local => None,
            NodeOrigin::Confirmed(id) => Some(*id),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, NodeOrigin::Confirmed(_))
    }
}

/// Fresh id for a node created in this session
pub fn local_node_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Fresh id for an edge created in this session
pub fn local_edge_id() -> String {
    format!("edge-{}", Uuid::new_v4())
}

// =============================================================================
// NODES
// =============================================================================

/// A node on the quest map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestNode {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Top-left corner of the node box in map coordinates
    pub position: Pos2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recommended: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_comment: Option<String>,
    /// Breakdown provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Expand provenance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_to_id: Option<String>,
    #[serde(default)]
    pub origin: NodeOrigin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuestNode {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        node_type: NodeType,
        status: NodeStatus,
        position: Pos2,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            node_type,
            status,
            category: None,
            position,
            is_recommended: None,
            ai_comment: None,
            parent_id: None,
            alternative_to_id: None,
            origin: NodeOrigin::Local,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a node with a freshly generated local id
    pub fn local(title: impl Into<String>, node_type: NodeType, status: NodeStatus, position: Pos2) -> Self {
        Self::new(local_node_id(), title, node_type, status, position)
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_alternative_to(mut self, original_id: impl Into<String>) -> Self {
        self.alternative_to_id = Some(original_id.into());
        self
    }

    pub fn with_recommended(mut self, recommended: bool) -> Self {
        self.is_recommended = Some(recommended);
        self
    }

    pub fn with_origin(mut self, origin: NodeOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Partial update applied by `updateNode`. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recommended: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_comment: Option<String>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self == &NodePatch::default()
    }
}

// =============================================================================
// EDGES
// =============================================================================

/// Directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl QuestEdge {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            id: local_edge_id(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            weight: None,
            label: None,
        }
    }

    pub fn solid(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self::new(source_id, target_id, EdgeType::Solid)
    }

    pub fn dotted(source_id: impl Into<String>, target_id: impl Into<String>, weight: f32) -> Self {
        Self {
            weight: Some(weight),
            ..Self::new(source_id, target_id, EdgeType::Dotted)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// =============================================================================
// QUESTS
// =============================================================================

/// Full quest as exchanged with the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub goal: String,
    pub current_situation: String,
    #[serde(default)]
    pub nodes: Vec<QuestNode>,
    #[serde(default)]
    pub edges: Vec<QuestEdge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persisted quest list entry (no graph)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestSummary {
    pub id: String,
    pub goal: String,
    pub current_situation: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Quest> for QuestSummary {
    fn from(quest: &Quest) -> Self {
        Self {
            id: quest.id.clone(),
            goal: quest.goal.clone(),
            current_situation: quest.current_situation.clone(),
            created_at: quest.created_at,
            updated_at: quest.updated_at,
        }
    }
}

/// Nodes and edges produced by one operation, merged as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphDelta {
    pub nodes: Vec<QuestNode>,
    pub edges: Vec<QuestEdge>,
}

impl GraphDelta {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&NodeType::Current).unwrap(), "\"CURRENT\"");
        assert_eq!(serde_json::to_string(&NodeStatus::NotStarted).unwrap(), "\"NOT_STARTED\"");
        assert_eq!(serde_json::to_string(&EdgeType::Dotted).unwrap(), "\"DOTTED\"");
    }

    #[test]
    fn test_node_serialises_camel_case() {
        let node = QuestNode::new("n1", "Learn Rust", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(1.0, 2.0))
            .with_parent("p1");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "CHOICE");
        assert_eq!(json["parentId"], "p1");
        assert_eq!(json["position"]["x"], 1.0);
        assert!(json.get("alternativeToId").is_none());
    }

    #[test]
    fn test_local_ids_are_unique() {
        assert_ne!(local_node_id(), local_node_id());
        assert!(local_edge_id().starts_with("edge-"));
    }

    #[test]
    fn test_anchor_types_not_draggable() {
        assert!(!NodeType::Current.is_draggable());
        assert!(!NodeType::Goal.is_draggable());
        assert!(NodeType::Choice.is_draggable());
        assert!(NodeType::Future.is_draggable());
    }
}
