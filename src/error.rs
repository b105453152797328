//! Error types for the quest map engine
//!
//! Each layer owns a `thiserror` enum; `StoreError` in the store module
//! wraps them for the façade.

use thiserror::Error;

use crate::model::{NodeStatus, NodeType};

/// Errors raised by local graph mutations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node '{id}' not found")]
    UnknownNode { id: String },

    #[error("Node '{id}' is a {node_type:?} anchor and cannot be moved")]
    AnchorImmovable { id: String, node_type: NodeType },

    #[error("Node '{id}' is a {node_type:?} anchor and cannot be deleted")]
    AnchorProtected { id: String, node_type: NodeType },

    #[error("Node '{id}' is LOCKED and cannot move to {requested:?} until a predecessor completes")]
    LockedTransition { id: String, requested: NodeStatus },
}

/// Local storage failures (view state, quest summaries)
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),
}

/// Configuration loading failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },
}
