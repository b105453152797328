//! Quest map engine
//!
//! A quest is a goal, the user's current situation and a directed graph of
//! AI-suggested steps between them. This crate owns that graph and the
//! interactive canvas that edits it:
//!
//! - `geometry`: screen/map transforms, node boxes, edge curves, spatial
//!   hit-testing and golden-angle placement
//! - `layout`: deterministic placement of generated, broken-down and
//!   alternative nodes, plus the freeform keyword map
//! - `model`: node/edge collections, merge rules and the completion lifecycle
//! - `canvas`: the idle/panning/dragging input state machine
//! - `sync`: backend DTOs, the `QuestApi` boundary, the HTTP client and the
//!   command ledger
//! - `store`: `GraphStore`, the façade composing all of the above for a UI
//!
//! ```text
//! UI events ─► CanvasEngine ─► QuestGraph (local)
//!                                  ▲
//! GraphStore ─► RemoteSync ─► QuestApi ─► merge (id-idempotent)
//! ```

pub mod canvas;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod store;
pub mod sync;

pub use canvas::{CanvasEngine, InteractionState, PointerUp};
pub use config::QuestMapConfig;
pub use error::{ConfigError, GraphError, PersistError};
pub use geometry::{EdgePath, ViewState, Viewport};
pub use layout::{KeywordMap, LayoutAssigner, Suggestion};
pub use model::{
    reduce, EdgeType, GraphDelta, GraphEngine, GraphOp, NodeOrigin, NodeStatus, NodeType, Quest, QuestEdge,
    QuestGraph, QuestNode, ServerId,
};
pub use store::{GraphStore, StoreError, StoreEvent};
pub use sync::{ErrorCode, ErrorInfo, QuestApi, RemoteSync, SyncError};
