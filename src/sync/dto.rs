//! Backend request/response payloads
//!
//! Responses are deserialised into these types and then validated before
//! anything reaches the graph. Malformed AI payloads are rejected with
//! `SyncError::InvalidPayload` instead of being merged.

use chrono::{DateTime, Utc};
use emath::Pos2;
use serde::{Deserialize, Serialize};

use super::error::SyncError;
use crate::layout::{Priority, Suggestion};
use crate::model::*;

/// Longest title accepted from the AI
pub const MAX_TITLE_LEN: usize = 200;

/// Bounds for node/alternative counts sent to the backend
pub const MIN_COUNT: usize = 1;
pub const MAX_COUNT: usize = 12;

/// Validation applied at the sync boundary
pub trait Validate {
    fn validate(&self) -> Result<(), SyncError>;
}

fn validate_title(title: &str, what: &str) -> Result<(), SyncError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(SyncError::InvalidPayload(format!("{} has an empty title", what)));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(SyncError::InvalidPayload(format!(
            "{} title exceeds {} characters",
            what, MAX_TITLE_LEN
        )));
    }
    Ok(())
}

fn validate_count(count: usize, field: &str) -> Result<(), SyncError> {
    if (MIN_COUNT..=MAX_COUNT).contains(&count) {
        Ok(())
    } else {
        Err(SyncError::InvalidPayload(format!(
            "{} must be between {} and {}, got {}",
            field, MIN_COUNT, MAX_COUNT, count
        )))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// =============================================================================
// IDS
// =============================================================================

/// Id as sent by the backend: numeric for persisted rows, string otherwise
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(u64),
    Text(String),
}

impl WireId {
    pub fn server_id(&self) -> Option<ServerId> {
        match self {
            WireId::Number(n) => Some(ServerId(*n)),
            WireId::Text(s) => s.parse().ok().map(ServerId),
        }
    }

    pub fn origin(&self) -> NodeOrigin {
        match self.server_id() {
            Some(id) => NodeOrigin::Confirmed(id),
            None => NodeOrigin::Local,
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s.clone(),
        }
    }
}

// =============================================================================
// QUESTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestRequest {
    pub goal: String,
    pub current_situation: String,
}

impl Validate for CreateQuestRequest {
    fn validate(&self) -> Result<(), SyncError> {
        if self.goal.trim().is_empty() {
            return Err(SyncError::InvalidPayload("goal must not be empty".into()));
        }
        if self.current_situation.trim().is_empty() {
            return Err(SyncError::InvalidPayload("current situation must not be empty".into()));
        }
        Ok(())
    }
}

/// Quest metadata returned by create/list
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestDescriptor {
    pub id: WireId,
    pub goal: String,
    #[serde(alias = "current_situation")]
    pub current_situation: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuestDescriptor {
    pub fn to_summary(&self) -> QuestSummary {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        QuestSummary {
            id: self.id.as_key(),
            goal: self.goal.clone(),
            current_situation: self.current_situation.clone(),
            created_at,
            updated_at: self.updated_at.unwrap_or(created_at),
        }
    }
}

/// Node as stored by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerQuestNode {
    pub id: WireId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub category: Option<String>,
    pub position: Pos2,
    #[serde(default)]
    pub is_recommended: Option<bool>,
    #[serde(default)]
    pub ai_comment: Option<String>,
    #[serde(default)]
    pub parent_id: Option<WireId>,
    #[serde(default)]
    pub alternative_to_id: Option<WireId>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ServerQuestNode {
    pub fn into_node(self) -> QuestNode {
        let origin = self.id.origin();
        let mut node = QuestNode::new(self.id.as_key(), self.title, self.node_type, self.status, self.position)
            .with_description(self.description)
            .with_category(self.category)
            .with_origin(origin);
        node.is_recommended = self.is_recommended;
        node.ai_comment = self.ai_comment;
        node.parent_id = self.parent_id.map(|id| id.as_key());
        node.alternative_to_id = self.alternative_to_id.map(|id| id.as_key());
        if let Some(created_at) = self.created_at {
            node.created_at = created_at;
        }
        node.updated_at = self.updated_at.unwrap_or(node.created_at);
        node
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerQuestEdge {
    pub id: WireId,
    pub source_id: WireId,
    pub target_id: WireId,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default)]
    pub label: Option<String>,
}

impl ServerQuestEdge {
    pub fn into_edge(self) -> QuestEdge {
        QuestEdge {
            id: self.id.as_key(),
            source_id: self.source_id.as_key(),
            target_id: self.target_id.as_key(),
            edge_type: self.edge_type,
            weight: self.weight,
            label: self.label,
        }
    }
}

/// Full quest returned by `GET /quests/{id}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestPayload {
    #[serde(flatten)]
    pub descriptor: QuestDescriptor,
    #[serde(default)]
    pub nodes: Vec<ServerQuestNode>,
    #[serde(default)]
    pub edges: Vec<ServerQuestEdge>,
}

impl Validate for QuestPayload {
    fn validate(&self) -> Result<(), SyncError> {
        for node in &self.nodes {
            validate_title(&node.title, "quest node")?;
        }
        for anchor in [NodeType::Current, NodeType::Goal] {
            if self.nodes.iter().filter(|n| n.node_type == anchor).count() > 1 {
                return Err(SyncError::InvalidPayload(format!(
                    "quest has more than one {} node",
                    anchor.as_str()
                )));
            }
        }
        Ok(())
    }
}

impl QuestPayload {
    pub fn into_quest(self) -> Quest {
        let summary = self.descriptor.to_summary();
        Quest {
            id: summary.id,
            goal: summary.goal,
            current_situation: summary.current_situation,
            nodes: self.nodes.into_iter().map(ServerQuestNode::into_node).collect(),
            edges: self.edges.into_iter().map(ServerQuestEdge::into_edge).collect(),
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }
    }
}

// =============================================================================
// GENERATE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateNodesRequest {
    pub quest_id: String,
    pub context: String,
    pub node_count: usize,
}

impl Validate for GenerateNodesRequest {
    fn validate(&self) -> Result<(), SyncError> {
        validate_count(self.node_count, "node_count")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SuggestedNode {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

impl From<SuggestedNode> for Suggestion {
    fn from(dto: SuggestedNode) -> Self {
        Suggestion {
            title: dto.title.trim().to_string(),
            description: non_blank(dto.description),
            category: non_blank(dto.category),
            priority: dto.priority,
            note: non_blank(dto.expected_outcome),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerateNodesResponse {
    pub suggested_nodes: Vec<SuggestedNode>,
}

impl Validate for GenerateNodesResponse {
    fn validate(&self) -> Result<(), SyncError> {
        self.suggested_nodes
            .iter()
            .try_for_each(|s| validate_title(&s.title, "suggested node"))
    }
}

// =============================================================================
// BREAKDOWN / EXPAND
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BreakdownRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subtask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

impl From<Subtask> for Suggestion {
    fn from(dto: Subtask) -> Self {
        Suggestion {
            title: dto.title.trim().to_string(),
            description: non_blank(dto.description),
            category: non_blank(dto.category),
            priority: None,
            note: non_blank(dto.expected_outcome),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BreakdownResponse {
    pub subtasks: Vec<Subtask>,
}

impl Validate for BreakdownResponse {
    fn validate(&self) -> Result<(), SyncError> {
        self.subtasks
            .iter()
            .try_for_each(|s| validate_title(&s.title, "subtask"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpandRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternative_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Validate for ExpandRequest {
    fn validate(&self) -> Result<(), SyncError> {
        match self.alternative_count {
            Some(count) => validate_count(count, "alternative_count"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alternative {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl From<Alternative> for Suggestion {
    fn from(dto: Alternative) -> Self {
        Suggestion {
            title: dto.title.trim().to_string(),
            description: non_blank(dto.description),
            category: non_blank(dto.category),
            priority: dto.priority,
            note: non_blank(dto.rationale),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpandResponse {
    pub alternatives: Vec<Alternative>,
}

impl Validate for ExpandResponse {
    fn validate(&self) -> Result<(), SyncError> {
        self.alternatives
            .iter()
            .try_for_each(|s| validate_title(&s.title, "alternative"))
    }
}

// =============================================================================
// COMPLETE / CONSULT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub feedback: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_current_situation: Option<String>,
}

/// `updatedNode` of a completion. Only these fields are merged locally.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedNode {
    pub id: WireId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    pub ai_comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub updated_node: UpdatedNode,
    #[serde(default)]
    pub ai_comment: Option<String>,
    #[serde(default)]
    pub suggestions: Option<Vec<String>>,
}

impl Validate for CompleteResponse {
    fn validate(&self) -> Result<(), SyncError> {
        // blank titles are simply not merged
        if let Some(title) = self.updated_node.title.as_deref().filter(|t| !t.trim().is_empty()) {
            validate_title(title, "updated node")?;
        }
        Ok(())
    }
}

impl CompleteResponse {
    /// Field patch for the completed node, keeping local position and status
    pub fn node_patch(&self) -> NodePatch {
        NodePatch {
            title: non_blank(self.updated_node.title.clone()),
            description: non_blank(self.updated_node.description.clone()),
            ai_comment: non_blank(self.ai_comment.clone())
                .or_else(|| non_blank(self.updated_node.ai_comment.clone())),
            ..NodePatch::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsultRequest {
    pub question: String,
}

impl Validate for ConsultRequest {
    fn validate(&self) -> Result<(), SyncError> {
        if self.question.trim().is_empty() {
            return Err(SyncError::InvalidPayload("question must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultResponse {
    pub advice: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<String>>,
}

// =============================================================================
// NODE CRUD
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionUpdate {
    pub x: f32,
    pub y: f32,
}

impl From<Pos2> for PositionUpdate {
    fn from(p: Pos2) -> Self {
        Self { x: p.x, y: p.y }
    }
}
