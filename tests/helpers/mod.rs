//! Shared fixtures for integration tests: a scripted in-process QuestApi
//! and store constructors.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quest_map::layout::Priority;
use quest_map::model::{NodePatch, ServerId};
use quest_map::store::{GraphStore, LocalStorage, MemoryStorage};
use quest_map::sync::dto::*;
use quest_map::sync::{QuestApi, ReconcilePolicy, RemoteSync, SyncError};

type Result<T> = std::result::Result<T, SyncError>;

/// Backend double. Every call is recorded as `"<method> <detail>"`; failures
/// and delays can be queued per method name.
#[derive(Default)]
pub struct ScriptedApi {
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<SyncError>>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    quests: Mutex<Vec<QuestDescriptor>>,
    payloads: Mutex<HashMap<String, String>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        })
    }

    /// Fail the next call to `method` with `err`
    pub fn fail_next(&self, method: &'static str, err: SyncError) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(err);
    }

    pub fn delay(&self, method: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(method, delay);
    }

    /// Serve `json` from `GET /quests/{quest_id}`
    pub fn put_quest(&self, quest_id: &str, json: &str) {
        self.payloads
            .lock()
            .unwrap()
            .insert(quest_id.to_string(), json.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    async fn enter(&self, method: &'static str, detail: String) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", method, detail).trim().to_string());
        let delay = self.delays.lock().unwrap().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestApi for ScriptedApi {
    async fn create_quest(&self, req: &CreateQuestRequest) -> Result<QuestDescriptor> {
        self.enter("create_quest", req.goal.clone()).await?;
        let descriptor = QuestDescriptor {
            id: WireId::Number(self.next_id()),
            goal: req.goal.clone(),
            current_situation: req.current_situation.clone(),
            created_at: None,
            updated_at: None,
        };
        self.quests.lock().unwrap().push(descriptor.clone());
        Ok(descriptor)
    }

    async fn list_quests(&self) -> Result<Vec<QuestDescriptor>> {
        self.enter("list_quests", String::new()).await?;
        Ok(self.quests.lock().unwrap().clone())
    }

    async fn get_quest(&self, quest_id: &str) -> Result<QuestPayload> {
        self.enter("get_quest", quest_id.to_string()).await?;
        let json = self.payloads.lock().unwrap().get(quest_id).cloned();
        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Err(SyncError::Http {
                status: 404,
                message: "Not Found".into(),
                body: None,
            }),
        }
    }

    async fn delete_quest(&self, quest_id: &str) -> Result<()> {
        self.enter("delete_quest", quest_id.to_string()).await
    }

    async fn generate_nodes(&self, req: &GenerateNodesRequest) -> Result<GenerateNodesResponse> {
        self.enter("generate_nodes", req.quest_id.clone()).await?;
        Ok(GenerateNodesResponse {
            suggested_nodes: (0..req.node_count)
                .map(|i| SuggestedNode {
                    title: format!("Suggestion {}", i + 1),
                    description: Some(format!("Do thing {}", i + 1)),
                    category: Some("learning".into()),
                    priority: Some(if i == 0 { Priority::High } else { Priority::Medium }),
                    expected_outcome: Some("progress".into()),
                })
                .collect(),
        })
    }

    async fn breakdown_node(&self, node_key: &str, _req: &BreakdownRequest) -> Result<BreakdownResponse> {
        self.enter("breakdown_node", node_key.to_string()).await?;
        Ok(BreakdownResponse {
            subtasks: (0..2)
                .map(|i| Subtask {
                    title: format!("Subtask {}", i + 1),
                    description: None,
                    category: None,
                    expected_outcome: None,
                })
                .collect(),
        })
    }

    async fn expand_node(&self, node_key: &str, req: &ExpandRequest) -> Result<ExpandResponse> {
        self.enter("expand_node", node_key.to_string()).await?;
        Ok(ExpandResponse {
            alternatives: (0..req.alternative_count.unwrap_or(2))
                .map(|i| Alternative {
                    title: format!("Alternative {}", i + 1),
                    description: None,
                    category: None,
                    priority: Some(Priority::Low),
                    rationale: Some("another way".into()),
                })
                .collect(),
        })
    }

    async fn complete_node(&self, node_key: &str, _req: &CompleteRequest) -> Result<CompleteResponse> {
        self.enter("complete_node", node_key.to_string()).await?;
        let id = match node_key.parse::<u64>() {
            Ok(n) => WireId::Number(n),
            Err(_) => WireId::Text(node_key.to_string()),
        };
        Ok(CompleteResponse {
            updated_node: UpdatedNode {
                id,
                title: None,
                description: None,
                status: None,
                ai_comment: None,
            },
            ai_comment: Some("Well done".into()),
            suggestions: Some(vec!["Keep going".into()]),
        })
    }

    async fn consult_ai(&self, req: &ConsultRequest) -> Result<ConsultResponse> {
        self.enter("consult_ai", req.question.clone()).await?;
        Ok(ConsultResponse {
            advice: "Start small".into(),
            suggested_actions: Some(vec!["Write one test".into()]),
        })
    }

    async fn update_node_position(&self, quest_id: &str, node_id: ServerId, position: &PositionUpdate) -> Result<()> {
        self.enter(
            "update_node_position",
            format!("{}/{} {} {}", quest_id, node_id, position.x, position.y),
        )
        .await
    }

    async fn update_node(&self, quest_id: &str, node_id: ServerId, _patch: &NodePatch) -> Result<()> {
        self.enter("update_node", format!("{}/{}", quest_id, node_id)).await
    }

    async fn delete_node(&self, quest_id: &str, node_id: ServerId) -> Result<()> {
        self.enter("delete_node", format!("{}/{}", quest_id, node_id)).await
    }
}

pub fn store_with(api: &Arc<ScriptedApi>, policy: ReconcilePolicy) -> GraphStore {
    store_with_storage(api, policy, Arc::new(MemoryStorage::new()))
}

pub fn store_with_storage(api: &Arc<ScriptedApi>, policy: ReconcilePolicy, storage: Arc<dyn LocalStorage>) -> GraphStore {
    let api: Arc<dyn QuestApi> = api.clone();
    GraphStore::new(RemoteSync::new(api), storage, policy)
}

/// Quest 42 as stored by the backend: numeric ids throughout.
///
/// ```text
/// CURRENT(1) ─► CHOICE(10) ┄► FUTURE(20, LOCKED) ┄► GOAL(2)
///            └► CHOICE(11)
/// ```
pub const CONFIRMED_QUEST: &str = r#"{
    "id": 42,
    "goal": "Run a marathon",
    "currentSituation": "Couch",
    "createdAt": "2024-03-01T09:00:00Z",
    "nodes": [
        {"id": 1, "title": "Couch", "type": "CURRENT", "status": "IN_PROGRESS", "position": {"x": 100.0, "y": 400.0}},
        {"id": 2, "title": "Run a marathon", "type": "GOAL", "status": "NOT_STARTED", "position": {"x": 900.0, "y": 150.0}},
        {"id": 10, "title": "Walk daily", "type": "CHOICE", "status": "NOT_STARTED", "position": {"x": 380.0, "y": 250.0}},
        {"id": 11, "title": "Buy shoes", "type": "CHOICE", "status": "NOT_STARTED", "position": {"x": 380.0, "y": 370.0}},
        {"id": 20, "title": "Run 5k", "type": "FUTURE", "status": "LOCKED", "position": {"x": 640.0, "y": 300.0}}
    ],
    "edges": [
        {"id": 100, "sourceId": 1, "targetId": 10, "type": "SOLID"},
        {"id": 101, "sourceId": 1, "targetId": 11, "type": "SOLID"},
        {"id": 102, "sourceId": 10, "targetId": 20, "type": "DOTTED", "weight": 0.5},
        {"id": 103, "sourceId": 20, "targetId": 2, "type": "DOTTED", "weight": 0.3}
    ]
}"#;

/// Store with `CONFIRMED_QUEST` loaded
pub async fn confirmed_store(api: &Arc<ScriptedApi>, policy: ReconcilePolicy) -> GraphStore {
    api.put_quest("42", CONFIRMED_QUEST);
    let store = store_with(api, policy);
    store.load_quest("42").await.unwrap();
    store
}
