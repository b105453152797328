//! QuestApi trait: the only boundary between the quest map and the backend.
//!
//! `HttpQuestApi` talks to the real service; tests plug in scripted
//! in-process implementations.

use async_trait::async_trait;

use super::dto::*;
use super::error::SyncError;
use crate::model::{NodePatch, ServerId};

pub type Result<T> = std::result::Result<T, SyncError>;

#[async_trait]
pub trait QuestApi: Send + Sync {
    /// `POST /quests`
    async fn create_quest(&self, req: &CreateQuestRequest) -> Result<QuestDescriptor>;

    /// `GET /quests`
    async fn list_quests(&self) -> Result<Vec<QuestDescriptor>>;

    /// `GET /quests/{id}` with nodes and edges
    async fn get_quest(&self, quest_id: &str) -> Result<QuestPayload>;

    /// `DELETE /quests/{id}`
    async fn delete_quest(&self, quest_id: &str) -> Result<()>;

    /// `POST /nodes/generate`
    async fn generate_nodes(&self, req: &GenerateNodesRequest) -> Result<GenerateNodesResponse>;

    /// `POST /nodes/{id}/breakdown`
    async fn breakdown_node(&self, node_key: &str, req: &BreakdownRequest) -> Result<BreakdownResponse>;

    /// `POST /nodes/{id}/expand`
    async fn expand_node(&self, node_key: &str, req: &ExpandRequest) -> Result<ExpandResponse>;

    /// `POST /nodes/{id}/complete`
    async fn complete_node(&self, node_key: &str, req: &CompleteRequest) -> Result<CompleteResponse>;

    /// `POST /ai/consult`
    async fn consult_ai(&self, req: &ConsultRequest) -> Result<ConsultResponse>;

    // ── Node CRUD (confirmed nodes only) ───────────────────────

    /// `PUT /quests/{qid}/nodes/{nid}/position`
    async fn update_node_position(&self, quest_id: &str, node_id: ServerId, position: &PositionUpdate) -> Result<()>;

    /// `PUT /quests/{qid}/nodes/{nid}`
    async fn update_node(&self, quest_id: &str, node_id: ServerId, patch: &NodePatch) -> Result<()>;

    /// `DELETE /quests/{qid}/nodes/{nid}`
    async fn delete_node(&self, quest_id: &str, node_id: ServerId) -> Result<()>;
}
