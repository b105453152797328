//! Bearer token source
//!
//! Token acquisition and refresh mechanics live outside this crate; the
//! client only needs the current token and a way to ask for a new one
//! after a 401.

use async_trait::async_trait;
use std::sync::RwLock;

use super::error::SyncError;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current access token, if any
    async fn access_token(&self) -> Option<String>;

    /// Obtain a fresh token. Called at most once per request, after a 401.
    async fn refresh(&self) -> Result<(), SyncError>;
}

/// Fixed token (or none). Refresh always fails.
#[derive(Debug, Default)]
pub struct StaticToken {
    token: RwLock<Option<String>>,
}

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(&self, token: Option<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = token;
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    async fn refresh(&self) -> Result<(), SyncError> {
        Err(SyncError::AuthenticationRequired)
    }
}
