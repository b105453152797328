//! Backend synchronisation: wire DTOs, the QuestApi boundary, the HTTP
//! client, the deadline-bounded RemoteSync facade and the command ledger

pub mod api;
pub mod auth;
pub mod dto;
pub mod error;
pub mod http;
pub mod ledger;
pub mod remote;

pub use api::QuestApi;
pub use auth::{StaticToken, TokenProvider};
pub use dto::Validate;
pub use error::{ErrorCode, ErrorInfo, SyncError};
pub use http::HttpQuestApi;
pub use ledger::{CommandEntry, CommandKind, CommandLedger, ReconcilePolicy, Undo};
pub use remote::{node_context, node_key, RemoteSync};
