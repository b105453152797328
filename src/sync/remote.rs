//! RemoteSync - deadline-bounded backend calls plus optimistic merges
//!
//! Fetch methods talk to the backend and hand back validated content.
//! Merge methods place that content with the `LayoutAssigner` and apply it
//! to a `GraphEngine` through id-idempotent ops, so a response merged twice
//! leaves the graph unchanged.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::api::{QuestApi, Result};
use super::dto::*;
use super::error::SyncError;
use crate::config::QuestMapConfig;
use crate::error::GraphError;
use crate::layout::{LayoutAssigner, Suggestion};
use crate::model::*;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_NODE_COUNT: usize = 5;

/// Id the backend knows a node by: its server id once confirmed, the local
/// id otherwise
pub fn node_key(node: &QuestNode) -> String {
    match node.origin.server_id() {
        Some(server_id) => server_id.to_string(),
        None => node.id.clone(),
    }
}

/// Free-text context sent with node requests
pub fn node_context(node: &QuestNode) -> String {
    match &node.description {
        Some(description) => format!("{}: {}", node.title, description),
        None => node.title.clone(),
    }
}

#[derive(Clone)]
pub struct RemoteSync {
    api: Arc<dyn QuestApi>,
    timeout: Duration,
    node_count: usize,
    layout: LayoutAssigner,
}

impl RemoteSync {
    pub fn new(api: Arc<dyn QuestApi>) -> Self {
        Self {
            api,
            timeout: DEFAULT_TIMEOUT,
            node_count: DEFAULT_NODE_COUNT,
            layout: LayoutAssigner::default(),
        }
    }

    pub fn from_config(api: Arc<dyn QuestApi>, config: &QuestMapConfig) -> Self {
        Self::new(api)
            .with_timeout(config.request_timeout)
            .with_node_count(config.node_count)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_node_count(mut self, node_count: usize) -> Self {
        self.node_count = node_count;
        self
    }

    pub fn with_layout(mut self, layout: LayoutAssigner) -> Self {
        self.layout = layout;
        self
    }

    pub fn layout(&self) -> &LayoutAssigner {
        &self.layout
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one backend call under the request deadline
    async fn deadline<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(op, code = err.code().as_str(), error = %err, "backend call failed");
                Err(err)
            }
            Err(_) => {
                warn!(op, timeout_secs = self.timeout.as_secs(), "backend call timed out");
                Err(SyncError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    // =========================================================================
    // QUESTS
    // =========================================================================

    pub async fn create_quest(&self, goal: &str, situation: &str) -> Result<QuestSummary> {
        let req = CreateQuestRequest {
            goal: goal.trim().to_string(),
            current_situation: situation.trim().to_string(),
        };
        req.validate()?;
        let descriptor = self.deadline("create_quest", self.api.create_quest(&req)).await?;
        let summary = descriptor.to_summary();
        info!(quest_id = %summary.id, "quest created");
        Ok(summary)
    }

    pub async fn list_quests(&self) -> Result<Vec<QuestSummary>> {
        let quests = self.deadline("list_quests", self.api.list_quests()).await?;
        Ok(quests.iter().map(QuestDescriptor::to_summary).collect())
    }

    /// Rehydrate a quest with its graph
    pub async fn load_quest(&self, quest_id: &str) -> Result<Quest> {
        let payload = self.deadline("get_quest", self.api.get_quest(quest_id)).await?;
        payload.validate()?;
        let quest = payload.into_quest();
        debug!(quest_id = %quest.id, nodes = quest.nodes.len(), "quest loaded");
        Ok(quest)
    }

    pub async fn delete_quest(&self, quest_id: &str) -> Result<()> {
        self.deadline("delete_quest", self.api.delete_quest(quest_id)).await
    }

    // =========================================================================
    // AI CONTENT
    // =========================================================================

    pub async fn fetch_generated(&self, quest_id: &str, goal: &str, situation: &str) -> Result<Vec<Suggestion>> {
        let req = GenerateNodesRequest {
            quest_id: quest_id.to_string(),
            context: format!("Goal: {}\nCurrent situation: {}", goal, situation),
            node_count: self.node_count,
        };
        req.validate()?;
        let resp = self.deadline("generate_nodes", self.api.generate_nodes(&req)).await?;
        resp.validate()?;
        debug!(quest_id = %quest_id, suggestions = resp.suggested_nodes.len(), "generate response");
        Ok(resp.suggested_nodes.into_iter().map(Suggestion::from).collect())
    }

    pub async fn fetch_breakdown(&self, node_key: &str, req: &BreakdownRequest) -> Result<Vec<Suggestion>> {
        let resp = self
            .deadline("breakdown_node", self.api.breakdown_node(node_key, req))
            .await?;
        resp.validate()?;
        Ok(resp.subtasks.into_iter().map(Suggestion::from).collect())
    }

    pub async fn fetch_alternatives(&self, node_key: &str, req: &ExpandRequest) -> Result<Vec<Suggestion>> {
        req.validate()?;
        let resp = self
            .deadline("expand_node", self.api.expand_node(node_key, req))
            .await?;
        resp.validate()?;
        Ok(resp.alternatives.into_iter().map(Suggestion::from).collect())
    }

    pub async fn complete(&self, node_key: &str, req: &CompleteRequest) -> Result<CompleteResponse> {
        let resp = self
            .deadline("complete_node", self.api.complete_node(node_key, req))
            .await?;
        resp.validate()?;
        Ok(resp)
    }

    pub async fn consult(&self, question: &str) -> Result<ConsultResponse> {
        let req = ConsultRequest {
            question: question.trim().to_string(),
        };
        req.validate()?;
        self.deadline("consult_ai", self.api.consult_ai(&req)).await
    }

    // =========================================================================
    // NODE CRUD
    // =========================================================================

    pub async fn push_position(&self, quest_id: &str, server_id: ServerId, position: PositionUpdate) -> Result<()> {
        self.deadline(
            "update_node_position",
            self.api.update_node_position(quest_id, server_id, &position),
        )
        .await
    }

    pub async fn push_fields(&self, quest_id: &str, server_id: ServerId, patch: &NodePatch) -> Result<()> {
        self.deadline("update_node", self.api.update_node(quest_id, server_id, patch))
            .await
    }

    pub async fn delete_node(&self, quest_id: &str, server_id: ServerId) -> Result<()> {
        self.deadline("delete_node", self.api.delete_node(quest_id, server_id))
            .await
    }

    // =========================================================================
    // MERGES
    // =========================================================================

    /// Place a bulk generate and merge it; returns what was placed
    pub fn merge_generated(&self, engine: &mut GraphEngine, suggestions: Vec<Suggestion>) -> std::result::Result<GraphDelta, GraphError> {
        let delta = self.layout.generate(
            engine.graph(),
            engine.goal(),
            engine.current_situation(),
            suggestions,
        );
        engine.apply(GraphOp::Merge(delta.clone()))?;
        Ok(delta)
    }

    pub fn merge_breakdown(
        &self,
        engine: &mut GraphEngine,
        parent_id: &str,
        subtasks: Vec<Suggestion>,
    ) -> std::result::Result<GraphDelta, GraphError> {
        let delta = self.layout.breakdown(engine.graph(), parent_id, subtasks)?;
        engine.apply(GraphOp::Merge(delta.clone()))?;
        Ok(delta)
    }

    pub fn merge_alternatives(
        &self,
        engine: &mut GraphEngine,
        original_id: &str,
        alternatives: Vec<Suggestion>,
    ) -> std::result::Result<GraphDelta, GraphError> {
        let delta = self.layout.expand(engine.graph(), original_id, alternatives)?;
        engine.apply(GraphOp::Merge(delta.clone()))?;
        Ok(delta)
    }

    /// Fold a completion response into the already-completed local node.
    ///
    /// Title, description and comment replace local values only when
    /// present. Position and status stay local.
    pub fn merge_completion(
        &self,
        engine: &mut GraphEngine,
        node_id: &str,
        resp: &CompleteResponse,
    ) -> std::result::Result<bool, GraphError> {
        let mut changed = false;
        let patch = resp.node_patch();
        if !patch.is_empty() {
            changed |= engine.apply(GraphOp::UpdateNode {
                id: node_id.to_string(),
                patch,
            })?;
        }
        if let Some(server_id) = resp.updated_node.id.server_id() {
            changed |= engine.apply(GraphOp::ConfirmNode {
                id: node_id.to_string(),
                server_id,
            })?;
        }
        Ok(changed)
    }
}

impl std::fmt::Debug for RemoteSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSync")
            .field("timeout", &self.timeout)
            .field("node_count", &self.node_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emath::Pos2;

    /// Answers generate slowly and everything else with NO_RESPONSE
    struct SlowApi {
        delay: Duration,
    }

    #[async_trait]
    impl QuestApi for SlowApi {
        async fn create_quest(&self, _: &CreateQuestRequest) -> Result<QuestDescriptor> {
            Err(SyncError::NoResponse)
        }
        async fn list_quests(&self) -> Result<Vec<QuestDescriptor>> {
            Ok(Vec::new())
        }
        async fn get_quest(&self, _: &str) -> Result<QuestPayload> {
            Err(SyncError::NoResponse)
        }
        async fn delete_quest(&self, _: &str) -> Result<()> {
            Ok(())
        }
        async fn generate_nodes(&self, req: &GenerateNodesRequest) -> Result<GenerateNodesResponse> {
            tokio::time::sleep(self.delay).await;
            Ok(GenerateNodesResponse {
                suggested_nodes: (0..req.node_count)
                    .map(|i| SuggestedNode {
                        title: format!("step {}", i),
                        description: None,
                        category: None,
                        priority: None,
                        expected_outcome: None,
                    })
                    .collect(),
            })
        }
        async fn breakdown_node(&self, _: &str, _: &BreakdownRequest) -> Result<BreakdownResponse> {
            Err(SyncError::NoResponse)
        }
        async fn expand_node(&self, _: &str, _: &ExpandRequest) -> Result<ExpandResponse> {
            Err(SyncError::NoResponse)
        }
        async fn complete_node(&self, _: &str, _: &CompleteRequest) -> Result<CompleteResponse> {
            Err(SyncError::NoResponse)
        }
        async fn consult_ai(&self, _: &ConsultRequest) -> Result<ConsultResponse> {
            Err(SyncError::NoResponse)
        }
        async fn update_node_position(&self, _: &str, _: ServerId, _: &PositionUpdate) -> Result<()> {
            Ok(())
        }
        async fn update_node(&self, _: &str, _: ServerId, _: &NodePatch) -> Result<()> {
            Ok(())
        }
        async fn delete_node(&self, _: &str, _: ServerId) -> Result<()> {
            Ok(())
        }
    }

    fn remote(delay_secs: u64) -> RemoteSync {
        RemoteSync::new(Arc::new(SlowApi {
            delay: Duration::from_secs(delay_secs),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout_error() {
        let err = remote(61).fetch_generated("q", "g", "s").await.unwrap_err();
        assert_eq!(err, SyncError::Timeout(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_then_merge_is_idempotent() {
        let remote = remote(1);
        let suggestions = remote.fetch_generated("q", "g", "s").await.unwrap();
        assert_eq!(suggestions.len(), DEFAULT_NODE_COUNT);

        let mut engine = GraphEngine::for_quest("q", "g", "s");
        let delta = remote.merge_generated(&mut engine, suggestions).unwrap();
        assert_eq!(engine.graph().node_count(), 7);

        let revision = engine.revision();
        engine.apply(GraphOp::Merge(delta)).unwrap();
        assert_eq!(engine.revision(), revision);
    }

    #[tokio::test]
    async fn test_invalid_count_rejected_before_send() {
        let err = remote(0)
            .with_node_count(0)
            .fetch_generated("q", "g", "s")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[test]
    fn test_merge_completion_keeps_position() {
        let mut engine = GraphEngine::new();
        let node = QuestNode::new("local-1", "old", NodeType::Choice, NodeStatus::NotStarted, Pos2::new(5.0, 5.0));
        engine.apply(GraphOp::AddNodes(vec![node])).unwrap();
        engine.complete("local-1").unwrap();

        let resp: CompleteResponse = serde_json::from_str(
            r#"{"updatedNode": {"id": 9, "title": "new", "status": "NOT_STARTED"}, "aiComment": "nice"}"#,
        )
        .unwrap();
        assert!(remote(0).merge_completion(&mut engine, "local-1", &resp).unwrap());

        let node = engine.graph().node("local-1").unwrap();
        assert_eq!(node.title, "new");
        assert_eq!(node.ai_comment.as_deref(), Some("nice"));
        assert_eq!(node.status, NodeStatus::Completed);
        assert_eq!(node.position, Pos2::new(5.0, 5.0));
        assert_eq!(node.origin, NodeOrigin::Confirmed(ServerId(9)));
    }

    #[test]
    fn test_node_key_prefers_server_id() {
        let node = QuestNode::local("x", NodeType::Choice, NodeStatus::NotStarted, Pos2::ZERO);
        assert_eq!(node_key(&node), node.id);
        let node = node.with_origin(NodeOrigin::Confirmed(ServerId(4)));
        assert_eq!(node_key(&node), "4");
    }
}
