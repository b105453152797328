//! GraphStore - the façade the UI talks to
//!
//! One store owns one quest session: the `GraphEngine`, the canvas, the UI
//! status slice and the command ledger. Canvas events are handled
//! synchronously; backend-bound operations are async.
//!
//! Locking:
//! - session state sits behind a std `Mutex` that is never held across an
//!   `.await`
//! - generate/breakdown/expand/complete/consult and quest switching take the
//!   single-flight lock for their whole duration, so their graph merges never
//!   interleave
//! - position updates bypass single-flight; drag commits are pushed from a
//!   spawned task and `settle()` waits for them

pub mod events;
pub mod persist;
pub mod ui;

pub use events::StoreEvent;
pub use persist::{FileStorage, LocalStorage, MemoryStorage, PersistedState};
pub use ui::UiState;

use emath::{Pos2, Vec2};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::canvas::{CanvasEngine, ContextMenu, InteractionState, PointerUp};
use crate::config::QuestMapConfig;
use crate::error::{GraphError, PersistError};
use crate::geometry::{EdgePath, ViewState};
use crate::layout::{Keyword, KeywordMap};
use crate::model::*;
use crate::sync::dto::{BreakdownRequest, CompleteRequest, ConsultResponse, ExpandRequest};
use crate::sync::{
    node_context, node_key, CommandEntry, CommandKind, CommandLedger, ErrorInfo, HttpQuestApi, ReconcilePolicy,
    RemoteSync, StaticToken, SyncError, TokenProvider, Undo,
};

const EVENT_CAPACITY: usize = 64;

/// Pause before re-sending a failed remote leg, multiplied by the attempt
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("No quest is active")]
    NoActiveQuest,
}

impl StoreError {
    /// Structured form for backend failures
    pub fn info(&self) -> Option<ErrorInfo> {
        match self {
            StoreError::Sync(err) => Some(err.to_info()),
            _ => None,
        }
    }
}

/// Result of a completion round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub completion: Completion,
    pub ai_comment: Option<String>,
    pub suggestions: Vec<String>,
}

/// What happened to the remote leg of a position update
#[derive(Debug, Clone, PartialEq)]
pub enum PositionSync {
    /// Node is not confirmed by the backend; nothing was sent
    LocalOnly,
    Synced,
    /// Logged and recorded in the ledger; `ui.error` is left alone
    Failed(ErrorInfo),
}

struct Session {
    engine: GraphEngine,
    canvas: CanvasEngine,
    ui: UiState,
    ledger: CommandLedger,
    quests: Vec<QuestSummary>,
    keywords: KeywordMap,
    /// Node position when the current drag started
    drag_origin: Option<(String, Pos2)>,
}

struct StoreInner {
    remote: RemoteSync,
    policy: ReconcilePolicy,
    storage: Arc<dyn LocalStorage>,
    session: Mutex<Session>,
    flight: tokio::sync::Mutex<()>,
    events: broadcast::Sender<StoreEvent>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

/// Cheap to clone; clones share the session
#[derive(Clone)]
pub struct GraphStore {
    inner: Arc<StoreInner>,
}

/// Holds `ui.is_loading` up until dropped
struct LoadingGuard {
    inner: Arc<StoreInner>,
}

impl LoadingGuard {
    fn begin(inner: &Arc<StoreInner>) -> Self {
        let flipped = inner.session().ui.begin_loading();
        if flipped {
            inner.emit(StoreEvent::LoadingChanged(true));
        }
        Self {
            inner: Arc::clone(inner),
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let flipped = self.inner.session().ui.end_loading();
        if flipped {
            self.inner.emit(StoreEvent::LoadingChanged(false));
        }
    }
}

impl StoreInner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Put an error into `ui.error` and hand it back
    fn surface(&self, err: StoreError) -> StoreError {
        self.surface_for(err, None)
    }

    /// `surface` for the remote leg of ledger command `seq`
    fn surface_for(&self, err: StoreError, seq: Option<u64>) -> StoreError {
        let message = err.to_string();
        let info = err.info();
        self.session().ui.set_error(message.clone(), info.clone(), seq);
        warn!(error = %message, "store operation failed");
        self.emit(StoreEvent::Error { message, info });
        err
    }

    fn record(&self, kind: CommandKind) -> u64 {
        let mut session = self.session();
        let seq = session.ledger.record(kind);
        session.ledger.attempt(seq);
        seq
    }

    fn confirm(&self, seq: u64) {
        self.session().ledger.confirm(seq);
    }

    fn remote_failed(&self, seq: u64, err: SyncError) -> StoreError {
        self.session().ledger.fail(seq, err.to_info());
        self.surface_for(StoreError::Sync(err), Some(seq))
    }

    /// Drop the error a command surfaced once it has been confirmed after all
    fn clear_error_of(&self, seq: u64) {
        let cleared = self.session().ui.clear_error_of(seq);
        if cleared {
            self.emit(StoreEvent::ErrorCleared);
        }
    }

    fn persist_view(&self, view: &ViewState) {
        if let Err(e) = PersistedState::save_view_state(self.storage.as_ref(), view) {
            warn!(error = %e, "failed to persist view state");
        }
    }

    fn persist_quests(&self, quests: &[QuestSummary]) {
        if let Err(e) = PersistedState::save_quests(self.storage.as_ref(), quests) {
            warn!(error = %e, "failed to persist quest list");
        }
    }

    /// Remote leg of a position update
    async fn sync_position(
        &self,
        seq: u64,
        node_id: &str,
        position: Pos2,
        origin: NodeOrigin,
        quest_id: Option<String>,
    ) -> PositionSync {
        let (Some(server_id), Some(quest_id)) = (origin.server_id(), quest_id) else {
            debug!(node_id = %node_id, "node not confirmed, position kept local");
            return PositionSync::LocalOnly;
        };

        match self.remote.push_position(&quest_id, server_id, position.into()).await {
            Ok(()) => {
                self.confirm(seq);
                self.emit(StoreEvent::PositionSynced {
                    node_id: node_id.to_string(),
                });
                PositionSync::Synced
            }
            Err(err) => {
                warn!(node_id = %node_id, server_id = %server_id, error = %err, "position sync failed");
                let info = err.to_info();
                self.session().ledger.fail(seq, info.clone());
                if self.reconcile(seq, err.is_retryable()).await {
                    self.emit(StoreEvent::PositionSynced {
                        node_id: node_id.to_string(),
                    });
                    PositionSync::Synced
                } else {
                    PositionSync::Failed(info)
                }
            }
        }
    }

    /// Apply the reconcile policy to a failed command; true if it was
    /// eventually confirmed. Non-retryable failures are kept under `Retry`.
    async fn reconcile(&self, seq: u64, retryable: bool) -> bool {
        match self.policy {
            ReconcilePolicy::Keep => false,
            ReconcilePolicy::Rollback => {
                self.rollback(seq);
                false
            }
            ReconcilePolicy::Retry { max_attempts } if retryable => self.retry(seq, max_attempts).await,
            ReconcilePolicy::Retry { .. } => false,
        }
    }

    fn rollback(&self, seq: u64) -> bool {
        let (changed, revision) = {
            let mut session = self.session();
            let Some(undo) = session.ledger.take_rollback(seq) else {
                return false;
            };
            let mut changed = false;
            for op in undo.into_ops() {
                let name = op.name();
                match session.engine.apply(op) {
                    Ok(c) => changed |= c,
                    Err(e) => warn!(seq, op = name, error = %e, "rollback op rejected"),
                }
            }
            (changed, session.engine.revision())
        };
        info!(seq, changed, "rolled back failed command");
        if changed {
            self.emit(StoreEvent::GraphChanged { revision });
        }
        true
    }

    async fn retry(&self, seq: u64, max_attempts: u32) -> bool {
        loop {
            let entry = self.session().ledger.get(seq).cloned();
            let Some(entry) = entry else {
                return false;
            };
            if entry.remote_confirmed {
                return true;
            }
            if !entry.kind.is_replayable() || entry.attempts >= max_attempts {
                warn!(seq, command = entry.kind.name(), attempts = entry.attempts, "giving up on remote leg");
                return false;
            }

            let target = self.resend_target(&entry.kind);
            let Some((quest_id, server_id)) = target else {
                return false;
            };

            tokio::time::sleep(RETRY_BACKOFF * entry.attempts).await;
            let attempt = self.session().ledger.attempt(seq);
            debug!(seq, attempt, command = entry.kind.name(), "retrying remote leg");

            let result = match &entry.kind {
                CommandKind::UpdatePosition { position, .. } => {
                    self.remote.push_position(&quest_id, server_id, (*position).into()).await
                }
                CommandKind::UpdateNode { patch, .. } => self.remote.push_fields(&quest_id, server_id, patch).await,
                _ => return false,
            };
            match result {
                Ok(()) => {
                    self.confirm(seq);
                    info!(seq, attempt, "remote leg confirmed on retry");
                    return true;
                }
                Err(err) => {
                    self.session().ledger.fail(seq, err.to_info());
                    if !err.is_retryable() {
                        return false;
                    }
                }
            }
        }
    }

    /// Quest id and server id to re-send a node command to
    fn resend_target(&self, kind: &CommandKind) -> Option<(String, ServerId)> {
        let node_id = match kind {
            CommandKind::UpdatePosition { node_id, .. } | CommandKind::UpdateNode { node_id, .. } => node_id,
            _ => return None,
        };
        let session = self.session();
        let quest_id = session.engine.quest_id()?.to_string();
        let server_id = session.engine.graph().node(node_id)?.origin.server_id()?;
        Some((quest_id, server_id))
    }
}

impl GraphStore {
    pub fn new(remote: RemoteSync, storage: Arc<dyn LocalStorage>, policy: ReconcilePolicy) -> Self {
        let persisted = PersistedState::load(storage.as_ref());
        let mut canvas = CanvasEngine::default();
        if let Some(view) = &persisted.view_state {
            canvas.restore_view_state(view);
        }
        let keywords = KeywordMap::new(canvas.viewport().center(canvas.size()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(StoreInner {
                remote,
                policy,
                storage,
                session: Mutex::new(Session {
                    engine: GraphEngine::new(),
                    canvas,
                    ui: UiState::default(),
                    ledger: CommandLedger::default(),
                    quests: persisted.quests,
                    keywords,
                    drag_origin: None,
                }),
                flight: tokio::sync::Mutex::new(()),
                events,
                background: Mutex::new(Vec::new()),
            }),
        }
    }

    /// HTTP backend with the configured token, file or in-memory storage
    pub fn from_config(config: &QuestMapConfig) -> Result<Self, StoreError> {
        let tokens: Arc<dyn TokenProvider> = Arc::new(StaticToken::new(config.api_token.clone()));
        Self::from_config_with_tokens(config, tokens)
    }

    pub fn from_config_with_tokens(config: &QuestMapConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, StoreError> {
        let api = HttpQuestApi::from_config(config, tokens)?;
        let remote = RemoteSync::from_config(Arc::new(api), config);
        let storage: Arc<dyn LocalStorage> = match &config.state_dir {
            Some(dir) => Arc::new(FileStorage::new(dir)?),
            None => Arc::new(MemoryStorage::new()),
        };
        Ok(Self::new(remote, storage, config.reconcile_policy))
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn graph(&self) -> QuestGraph {
        self.inner.session().engine.graph().clone()
    }

    pub fn engine(&self) -> GraphEngine {
        self.inner.session().engine.clone()
    }

    pub fn node(&self, node_id: &str) -> Option<QuestNode> {
        self.inner.session().engine.graph().node(node_id).cloned()
    }

    pub fn quest_id(&self) -> Option<String> {
        self.inner.session().engine.quest_id().map(str::to_string)
    }

    pub fn revision(&self) -> u64 {
        self.inner.session().engine.revision()
    }

    pub fn ui(&self) -> UiState {
        self.inner.session().ui.clone()
    }

    pub fn canvas(&self) -> CanvasEngine {
        self.inner.session().canvas.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.inner.session().canvas.view_state()
    }

    pub fn quests(&self) -> Vec<QuestSummary> {
        self.inner.session().quests.clone()
    }

    pub fn ledger(&self) -> Vec<CommandEntry> {
        self.inner.session().ledger.entries().cloned().collect()
    }

    pub fn policy(&self) -> ReconcilePolicy {
        self.inner.policy
    }

    /// Bezier path of every edge, in map coordinates
    pub fn edge_paths(&self) -> Vec<(String, EdgePath)> {
        let session = self.inner.session();
        let graph = session.engine.graph();
        graph
            .edges()
            .filter_map(|edge| {
                let source = graph.node(&edge.source_id)?;
                let target = graph.node(&edge.target_id)?;
                Some((edge.id.clone(), EdgePath::between(source, target)))
            })
            .collect()
    }

    pub fn clear_error(&self) {
        let cleared = self.inner.session().ui.clear_error();
        if cleared {
            self.inner.emit(StoreEvent::ErrorCleared);
        }
    }

    /// Wait for background position syncs spawned by drag commits
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.inner.background());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "position sync task failed");
                }
            }
        }
    }

    // =========================================================================
    // QUESTS
    // =========================================================================

    /// Start a local session for an existing engine (no backend call)
    pub fn open_session(&self, engine: GraphEngine) {
        let (quest_id, revision) = {
            let mut session = self.inner.session();
            session.engine = engine;
            session.canvas.select(None);
            session.canvas.close_context_menu();
            session.drag_origin = None;
            (
                session.engine.quest_id().map(str::to_string),
                session.engine.revision(),
            )
        };
        self.inner.emit(StoreEvent::SessionChanged { quest_id });
        self.inner.emit(StoreEvent::GraphChanged { revision });
    }

    pub async fn create_quest(&self, goal: &str, situation: &str) -> Result<QuestSummary, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);
        let seq = self.inner.record(CommandKind::CreateQuest);

        let summary = match self.inner.remote.create_quest(goal, situation).await {
            Ok(summary) => summary,
            Err(e) => return Err(self.inner.remote_failed(seq, e)),
        };

        let quests = {
            let mut session = self.inner.session();
            session.ledger.confirm(seq);
            session.quests.retain(|q| q.id != summary.id);
            session.quests.insert(0, summary.clone());
            session.quests.clone()
        };
        self.inner.persist_quests(&quests);
        self.inner.emit(StoreEvent::QuestsChanged);
        self.open_session(GraphEngine::for_quest(
            &summary.id,
            &summary.goal,
            &summary.current_situation,
        ));
        info!(quest_id = %summary.id, "quest session started");
        Ok(summary)
    }

    /// Rehydrate a quest and its graph from the backend
    pub async fn load_quest(&self, quest_id: &str) -> Result<(), StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);
        let seq = self.inner.record(CommandKind::LoadQuest {
            quest_id: quest_id.to_string(),
        });

        let quest = match self.inner.remote.load_quest(quest_id).await {
            Ok(quest) => quest,
            Err(e) => return Err(self.inner.remote_failed(seq, e)),
        };

        let summary = QuestSummary::from(&quest);
        let quests = {
            let mut session = self.inner.session();
            session.ledger.confirm(seq);
            match session.quests.iter_mut().find(|q| q.id == summary.id) {
                Some(existing) => *existing = summary,
                None => session.quests.insert(0, summary),
            }
            session.quests.clone()
        };
        self.inner.persist_quests(&quests);
        self.inner.emit(StoreEvent::QuestsChanged);
        self.open_session(GraphEngine::from_quest(quest));
        Ok(())
    }

    pub async fn list_quests(&self) -> Result<Vec<QuestSummary>, StoreError> {
        let quests = self
            .inner
            .remote
            .list_quests()
            .await
            .map_err(|e| self.inner.surface(e.into()))?;
        self.inner.session().quests = quests.clone();
        self.inner.persist_quests(&quests);
        self.inner.emit(StoreEvent::QuestsChanged);
        Ok(quests)
    }

    pub async fn delete_quest(&self, quest_id: &str) -> Result<(), StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);
        let seq = self.inner.record(CommandKind::DeleteQuest {
            quest_id: quest_id.to_string(),
        });

        if let Err(e) = self.inner.remote.delete_quest(quest_id).await {
            return Err(self.inner.remote_failed(seq, e));
        }

        let (quests, was_active) = {
            let mut session = self.inner.session();
            session.ledger.confirm(seq);
            session.quests.retain(|q| q.id != quest_id);
            (
                session.quests.clone(),
                session.engine.quest_id() == Some(quest_id),
            )
        };
        self.inner.persist_quests(&quests);
        self.inner.emit(StoreEvent::QuestsChanged);
        if was_active {
            self.open_session(GraphEngine::new());
        }
        info!(quest_id = %quest_id, "quest deleted");
        Ok(())
    }

    // =========================================================================
    // AI OPERATIONS (single-flight)
    // =========================================================================

    /// Bulk generate for the active quest; returns what was merged
    pub async fn generate_nodes(&self) -> Result<GraphDelta, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);

        let prepared = {
            let session = self.inner.session();
            session.engine.quest_id().map(|quest_id| {
                (
                    quest_id.to_string(),
                    session.engine.goal().to_string(),
                    session.engine.current_situation().to_string(),
                )
            })
        };
        let (quest_id, goal, situation) = prepared
            .ok_or(StoreError::NoActiveQuest)
            .map_err(|e| self.inner.surface(e))?;
        let seq = self.inner.record(CommandKind::Generate);

        let suggestions = match self
            .inner
            .remote
            .fetch_generated(&quest_id, &goal, &situation)
            .await
        {
            Ok(suggestions) => suggestions,
            Err(e) => return Err(self.inner.remote_failed(seq, e)),
        };

        let (merged, revision) = {
            let mut session = self.inner.session();
            let merged = self.inner.remote.merge_generated(&mut session.engine, suggestions);
            if merged.is_ok() {
                session.ledger.mark_local(seq, None);
                session.ledger.confirm(seq);
            }
            (merged, session.engine.revision())
        };
        let delta = merged.map_err(|e| self.inner.surface(e.into()))?;
        info!(quest_id = %quest_id, nodes = delta.nodes.len(), edges = delta.edges.len(), "generated nodes merged");
        self.inner.emit(StoreEvent::GraphChanged { revision });
        Ok(delta)
    }

    /// Decompose a node into sub-task CHOICE nodes to its right
    pub async fn breakdown_node(&self, node_id: &str, detail_level: Option<String>) -> Result<GraphDelta, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);

        let (key, context) = self.node_request(node_id)?;
        let seq = self.inner.record(CommandKind::Breakdown {
            node_id: node_id.to_string(),
        });
        let req = BreakdownRequest {
            detail_level,
            context: Some(context),
        };

        let subtasks = match self.inner.remote.fetch_breakdown(&key, &req).await {
            Ok(subtasks) => subtasks,
            Err(e) => return Err(self.inner.remote_failed(seq, e)),
        };

        let (merged, revision) = {
            let mut session = self.inner.session();
            let merged = self
                .inner
                .remote
                .merge_breakdown(&mut session.engine, node_id, subtasks);
            if merged.is_ok() {
                session.ledger.mark_local(seq, None);
                session.ledger.confirm(seq);
            }
            (merged, session.engine.revision())
        };
        let delta = merged.map_err(|e| self.inner.surface(e.into()))?;
        info!(node_id = %node_id, children = delta.nodes.len(), "breakdown merged");
        self.inner.emit(StoreEvent::GraphChanged { revision });
        Ok(delta)
    }

    /// Sibling alternatives below a node, inheriting its outgoing edges
    pub async fn expand_node(&self, node_id: &str, alternative_count: Option<usize>) -> Result<GraphDelta, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);

        let (key, context) = self.node_request(node_id)?;
        let seq = self.inner.record(CommandKind::Expand {
            node_id: node_id.to_string(),
        });
        let req = ExpandRequest {
            alternative_count,
            context: Some(context),
        };

        let alternatives = match self.inner.remote.fetch_alternatives(&key, &req).await {
            Ok(alternatives) => alternatives,
            Err(e) => return Err(self.inner.remote_failed(seq, e)),
        };

        let (merged, revision) = {
            let mut session = self.inner.session();
            let merged = self
                .inner
                .remote
                .merge_alternatives(&mut session.engine, node_id, alternatives);
            if merged.is_ok() {
                session.ledger.mark_local(seq, None);
                session.ledger.confirm(seq);
            }
            (merged, session.engine.revision())
        };
        let delta = merged.map_err(|e| self.inner.surface(e.into()))?;
        info!(node_id = %node_id, alternatives = delta.nodes.len(), "expand merged");
        self.inner.emit(StoreEvent::GraphChanged { revision });
        Ok(delta)
    }

    /// Complete a node locally (cascade included), then report it to the
    /// backend and fold its answer in
    pub async fn complete_node(
        &self,
        node_id: &str,
        feedback: &str,
        new_situation: Option<String>,
    ) -> Result<CompletionOutcome, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);

        let applied = {
            let mut session = self.inner.session();
            let Session { engine, ledger, .. } = &mut *session;
            let key = engine.graph().node(node_id).map(node_key);

            match (key, engine.complete(node_id)) {
                (Some(key), Ok(completion)) => {
                    let seq = ledger.record(CommandKind::Complete {
                        node_id: node_id.to_string(),
                    });
                    ledger.attempt(seq);
                    ledger.mark_local(seq, Some(Undo::revert(completion.reverts(node_id))));
                    Ok((seq, key, completion, engine.revision()))
                }
                (_, Err(e)) => Err(StoreError::from(e)),
                (None, Ok(_)) => Err(GraphError::UnknownNode { id: node_id.to_string() }.into()),
            }
        };
        let (seq, key, completion, revision) = applied.map_err(|e| self.inner.surface(e))?;
        self.inner.emit(StoreEvent::GraphChanged { revision });

        let req = CompleteRequest {
            feedback: feedback.to_string(),
            new_current_situation: new_situation.clone(),
        };
        let resp = match self.inner.remote.complete(&key, &req).await {
            Ok(resp) => resp,
            Err(e) => {
                let retryable = e.is_retryable();
                let err = self.inner.remote_failed(seq, e);
                self.inner.reconcile(seq, retryable).await;
                return Err(err);
            }
        };

        let revision = {
            let mut session = self.inner.session();
            if let Err(e) = self
                .inner
                .remote
                .merge_completion(&mut session.engine, node_id, &resp)
            {
                warn!(node_id = %node_id, error = %e, "completion response not merged");
            }
            if let Some(situation) = new_situation {
                apply_new_situation(&mut session.engine, situation);
            }
            session.ledger.confirm(seq);
            session.engine.revision()
        };
        info!(
            node_id = %node_id,
            unlocked = completion.unlocked.len(),
            solidified = completion.solidified.len(),
            "node completion confirmed"
        );
        self.inner.emit(StoreEvent::GraphChanged { revision });

        Ok(CompletionOutcome {
            completion,
            ai_comment: resp.ai_comment,
            suggestions: resp.suggestions.unwrap_or_default(),
        })
    }

    pub async fn consult_ai(&self, question: &str) -> Result<ConsultResponse, StoreError> {
        let _flight = self.inner.flight.lock().await;
        let _loading = LoadingGuard::begin(&self.inner);
        let seq = self.inner.record(CommandKind::ConsultAi);

        match self.inner.remote.consult(question).await {
            Ok(resp) => {
                self.inner.confirm(seq);
                Ok(resp)
            }
            Err(e) => Err(self.inner.remote_failed(seq, e)),
        }
    }

    /// Backend key and context for a node-scoped request
    fn node_request(&self, node_id: &str) -> Result<(String, String), StoreError> {
        let found = self
            .inner
            .session()
            .engine
            .graph()
            .node(node_id)
            .map(|node| (node_key(node), node_context(node)));
        found
            .ok_or_else(|| GraphError::UnknownNode { id: node_id.to_string() }.into())
            .map_err(|e| self.inner.surface(e))
    }

    // =========================================================================
    // NODE CRUD
    // =========================================================================

    /// Partial field update. Applied locally first; confirmed nodes are then
    /// updated on the backend.
    pub async fn update_node(&self, node_id: &str, patch: NodePatch) -> Result<bool, StoreError> {
        let _loading = LoadingGuard::begin(&self.inner);

        let applied = {
            let mut session = self.inner.session();
            let Session { engine, ledger, .. } = &mut *session;
            let origin = engine.graph().node(node_id).map(|n| n.origin);

            match engine.update(node_id, &patch) {
                Ok(reverts) => {
                    let changed = !reverts.is_empty();
                    let seq = ledger.record(CommandKind::UpdateNode {
                        node_id: node_id.to_string(),
                        patch: patch.clone(),
                    });
                    ledger.mark_local(seq, Some(Undo::revert(reverts)));
                    Ok((
                        seq,
                        changed,
                        origin,
                        engine.quest_id().map(str::to_string),
                        engine.revision(),
                    ))
                }
                Err(e) => Err(StoreError::from(e)),
            }
        };
        let (seq, changed, origin, quest_id, revision) = applied.map_err(|e| self.inner.surface(e))?;
        if changed {
            self.inner.emit(StoreEvent::GraphChanged { revision });
        }

        let target = origin.and_then(|o| o.server_id()).zip(quest_id);
        let Some((server_id, quest_id)) = target else {
            debug!(node_id = %node_id, "node not confirmed, update kept local");
            return Ok(changed);
        };

        self.inner.session().ledger.attempt(seq);
        match self.inner.remote.push_fields(&quest_id, server_id, &patch).await {
            Ok(()) => {
                self.inner.confirm(seq);
                Ok(changed)
            }
            Err(e) => {
                let retryable = e.is_retryable();
                let err = self.inner.remote_failed(seq, e);
                if self.inner.reconcile(seq, retryable).await {
                    self.inner.clear_error_of(seq);
                    return Ok(changed);
                }
                Err(err)
            }
        }
    }

    /// Move a node. Applied locally at once; only confirmed nodes are sent
    /// to the backend, and a failed send is logged rather than surfaced.
    pub async fn update_node_position(&self, node_id: &str, position: Pos2) -> Result<PositionSync, StoreError> {
        let applied = {
            let mut session = self.inner.session();
            let before = session.engine.graph().node(node_id).map(|n| (n.position, n.origin));
            match before {
                None => Err(StoreError::from(GraphError::UnknownNode { id: node_id.to_string() })),
                Some((old, origin)) => match session.engine.apply(GraphOp::SetPosition {
                    id: node_id.to_string(),
                    position,
                }) {
                    Ok(_) => {
                        let seq = session.ledger.record(CommandKind::UpdatePosition {
                            node_id: node_id.to_string(),
                            position,
                        });
                        session.ledger.mark_local(seq, Some(Undo::position(node_id, old, position)));
                        if origin.is_confirmed() {
                            session.ledger.attempt(seq);
                        }
                        Ok((
                            seq,
                            origin,
                            session.engine.quest_id().map(str::to_string),
                            session.engine.revision(),
                        ))
                    }
                    Err(e) => Err(StoreError::from(e)),
                },
            }
        };
        let (seq, origin, quest_id, revision) = applied.map_err(|e| self.inner.surface(e))?;
        self.inner.emit(StoreEvent::GraphChanged { revision });

        Ok(self
            .inner
            .sync_position(seq, node_id, position, origin, quest_id)
            .await)
    }

    /// Delete a node and its edges. Confirmed nodes are deleted on the
    /// backend first and kept locally if that fails.
    pub async fn delete_node(&self, node_id: &str) -> Result<(), StoreError> {
        let _loading = LoadingGuard::begin(&self.inner);

        let prepared = {
            let session = self.inner.session();
            match session.engine.graph().node(node_id) {
                None => Err(StoreError::from(GraphError::UnknownNode { id: node_id.to_string() })),
                Some(node) if node.node_type.is_anchor() => Err(GraphError::AnchorProtected {
                    id: node_id.to_string(),
                    node_type: node.node_type,
                }
                .into()),
                Some(node) => Ok((node.origin, session.engine.quest_id().map(str::to_string))),
            }
        };
        let (origin, quest_id) = prepared.map_err(|e| self.inner.surface(e))?;
        let seq = self.inner.record(CommandKind::DeleteNode {
            node_id: node_id.to_string(),
        });

        if let (Some(server_id), Some(quest_id)) = (origin.server_id(), quest_id) {
            if let Err(e) = self.inner.remote.delete_node(&quest_id, server_id).await {
                return Err(self.inner.remote_failed(seq, e));
            }
        }

        let revision = {
            let mut session = self.inner.session();
            let removed = session.engine.apply(GraphOp::RemoveNode {
                id: node_id.to_string(),
            });
            if let Err(e) = removed {
                warn!(node_id = %node_id, error = %e, "local delete rejected");
            }
            session.ledger.mark_local(seq, None);
            if origin.is_confirmed() {
                session.ledger.confirm(seq);
            }
            if session.canvas.selection() == Some(node_id) {
                session.canvas.select(None);
            }
            session.engine.revision()
        };
        info!(node_id = %node_id, "node deleted");
        self.inner.emit(StoreEvent::GraphChanged { revision });
        Ok(())
    }

    // =========================================================================
    // CANVAS EVENTS (synchronous)
    // =========================================================================

    pub fn pointer_down(&self, screen: Pos2) -> InteractionState {
        let (state, had_selection) = {
            let mut session = self.inner.session();
            let session = &mut *session;
            let had_selection = session.canvas.selection().is_some();
            let state = session
                .canvas
                .pointer_down(screen, session.engine.graph())
                .clone();
            session.drag_origin = match &state {
                InteractionState::DraggingNode { node_id, .. } => session
                    .engine
                    .graph()
                    .node(node_id)
                    .map(|n| (node_id.clone(), n.position)),
                _ => None,
            };
            (state, had_selection)
        };
        if had_selection {
            self.inner.emit(StoreEvent::SelectionChanged(None));
        }
        state
    }

    /// Live drag/pan; returns the dragged node's new position
    pub fn pointer_move(&self, screen: Pos2) -> Option<Pos2> {
        let (moved, revision) = {
            let mut session = self.inner.session();
            let session = &mut *session;
            let moved = session
                .canvas
                .pointer_move(screen, session.engine.graph_mut());
            if moved.is_some() {
                session.engine.mark_changed();
            }
            (moved, session.engine.revision())
        };
        if moved.is_some() {
            self.inner.emit(StoreEvent::GraphChanged { revision });
        }
        moved
    }

    pub fn pointer_up(&self) -> PointerUp {
        self.release(false)
    }

    pub fn pointer_leave(&self) -> PointerUp {
        self.release(true)
    }

    fn release(&self, left: bool) -> PointerUp {
        let (outcome, view, pending) = {
            let mut session = self.inner.session();
            let session = &mut *session;
            let outcome = if left {
                session.canvas.pointer_leave(session.engine.graph())
            } else {
                session.canvas.pointer_up(session.engine.graph())
            };
            let drag_origin = session.drag_origin.take();

            let pending = match &outcome {
                PointerUp::DragCommitted(commit) => {
                    let origin = session
                        .engine
                        .graph()
                        .node(&commit.node_id)
                        .map(|n| n.origin)
                        .unwrap_or_default();
                    let seq = session.ledger.record(CommandKind::UpdatePosition {
                        node_id: commit.node_id.clone(),
                        position: commit.position,
                    });
                    let undo = drag_origin
                        .filter(|(id, _)| *id == commit.node_id)
                        .map(|(id, old)| Undo::position(id, old, commit.position));
                    session.ledger.mark_local(seq, undo);
                    if origin.is_confirmed() {
                        session.ledger.attempt(seq);
                    }
                    Some((
                        seq,
                        commit.clone(),
                        origin,
                        session.engine.quest_id().map(str::to_string),
                    ))
                }
                _ => None,
            };
            (outcome, session.canvas.view_state(), pending)
        };

        match &outcome {
            PointerUp::Selected(node_id) => {
                self.inner.emit(StoreEvent::SelectionChanged(Some(node_id.clone())));
            }
            PointerUp::PanEnded => {
                self.inner.persist_view(&view);
                self.inner.emit(StoreEvent::ViewChanged(view));
            }
            PointerUp::DragCommitted(_) | PointerUp::None => {}
        }

        if let Some((seq, commit, origin, quest_id)) = pending {
            self.spawn_position_sync(seq, commit.node_id, commit.position, origin, quest_id);
        }
        outcome
    }

    fn spawn_position_sync(&self, seq: u64, node_id: String, position: Pos2, origin: NodeOrigin, quest_id: Option<String>) {
        if !origin.is_confirmed() {
            debug!(node_id = %node_id, "node not confirmed, drag kept local");
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(node_id = %node_id, "no async runtime, drag position not synced");
                return;
            }
        };
        let inner = Arc::clone(&self.inner);
        let task = handle.spawn(async move {
            inner
                .sync_position(seq, &node_id, position, origin, quest_id)
                .await;
        });
        let mut background = self.inner.background();
        background.retain(|h| !h.is_finished());
        background.push(task);
    }

    /// One wheel tick; returns the new zoom
    pub fn wheel(&self, delta_y: f32) -> f32 {
        let (zoom, view) = {
            let mut session = self.inner.session();
            let zoom = session.canvas.wheel(delta_y);
            (zoom, session.canvas.view_state())
        };
        self.inner.persist_view(&view);
        self.inner.emit(StoreEvent::ViewChanged(view));
        zoom
    }

    pub fn resize(&self, size: Vec2) {
        let view = {
            let mut session = self.inner.session();
            session.canvas.resize(size);
            session.canvas.view_state()
        };
        self.inner.persist_view(&view);
        self.inner.emit(StoreEvent::ViewChanged(view));
    }

    pub fn open_context_menu(&self, screen: Pos2) -> Option<ContextMenu> {
        let mut session = self.inner.session();
        let session = &mut *session;
        session
            .canvas
            .open_context_menu(screen, session.engine.graph())
            .cloned()
    }

    pub fn close_context_menu(&self) {
        self.inner.session().canvas.close_context_menu();
    }

    // =========================================================================
    // KEYWORD MAP
    // =========================================================================

    /// Place a keyword bubble; `None` if it is blank or already on the map
    pub fn add_keyword(&self, text: &str) -> Option<Keyword> {
        let mut rng = rand::thread_rng();
        self.inner
            .session()
            .keywords
            .add(text, &mut rng)
            .cloned()
    }

    pub fn remove_keyword(&self, text: &str) -> bool {
        self.inner.session().keywords.remove(text)
    }

    pub fn keywords(&self) -> Vec<Keyword> {
        self.inner.session().keywords.keywords().to_vec()
    }
}

/// Record a new current situation and retitle the CURRENT anchor with it
fn apply_new_situation(engine: &mut GraphEngine, situation: String) {
    let situation = situation.trim().to_string();
    if situation.is_empty() {
        return;
    }
    let current_id = engine
        .graph()
        .anchor(NodeType::Current)
        .map(|n| n.id.clone());
    if let Some(id) = current_id {
        let patch = NodePatch {
            title: Some(situation.clone()),
            ..NodePatch::default()
        };
        if let Err(e) = engine.apply(GraphOp::UpdateNode { id, patch }) {
            warn!(error = %e, "could not retitle CURRENT anchor");
        }
    }
    engine.set_current_situation(situation);
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("remote", &self.inner.remote)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}
