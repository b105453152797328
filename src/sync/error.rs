//! Remote call failures and their normalised UI shape

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable error codes surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TimeoutError,
    NoResponse,
    AuthenticationRequired,
    HttpError,
    NetworkError,
    InvalidPayload,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TimeoutError => "TIMEOUT_ERROR",
            ErrorCode::NoResponse => "NO_RESPONSE",
            ErrorCode::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorCode::HttpError => "HTTP_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

/// `{code, message, details}` as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Errors from the quest backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Request exceeded the {0}s deadline")]
    Timeout(u64),

    #[error("No response received from the server")]
    NoResponse,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Timeout(_) => ErrorCode::TimeoutError,
            SyncError::NoResponse => ErrorCode::NoResponse,
            SyncError::AuthenticationRequired => ErrorCode::AuthenticationRequired,
            SyncError::Http { .. } => ErrorCode::HttpError,
            SyncError::Network(_) => ErrorCode::NetworkError,
            SyncError::InvalidPayload(_) => ErrorCode::InvalidPayload,
            SyncError::Unknown(_) => ErrorCode::UnknownError,
        }
    }

    /// Whether re-sending the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Timeout(_) | SyncError::NoResponse | SyncError::Network(_) => true,
            SyncError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        let details = match self {
            SyncError::Http { status, body, .. } => Some(serde_json::json!({
                "status": status,
                "body": body,
            })),
            SyncError::Timeout(secs) => Some(serde_json::json!({ "timeoutSecs": secs })),
            _ => None,
        };
        ErrorInfo {
            code: self.code(),
            message: self.to_string(),
            details,
        }
    }

    /// Classify a transport failure
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(timeout_secs)
        } else if err.is_connect() || err.is_request() || err.is_body() {
            SyncError::Network(err.to_string())
        } else if err.is_decode() {
            SyncError::InvalidPayload(err.to_string())
        } else {
            SyncError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidPayload(err.to_string())
    }
}

impl From<SyncError> for ErrorInfo {
    fn from(err: SyncError) -> Self {
        err.to_info()
    }
}
