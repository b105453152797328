//! Runtime configuration from `QUEST_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::sync::ReconcilePolicy;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";

#[derive(Debug, Clone, PartialEq)]
pub struct QuestMapConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
    /// Suggestions requested per bulk generate
    pub node_count: usize,
    /// Directory for persisted view state and quest summaries; in-memory if unset
    pub state_dir: Option<PathBuf>,
    pub reconcile_policy: ReconcilePolicy,
}

impl Default for QuestMapConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(60),
            node_count: 5,
            state_dir: None,
            reconcile_policy: ReconcilePolicy::Keep,
        }
    }
}

impl QuestMapConfig {
    /// Read the process environment. Call `dotenvy::dotenv()` first to pick
    /// up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(url) = get("QUEST_API_BASE_URL") {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid("QUEST_API_BASE_URL", url, "must be an http(s) URL"));
            }
            config.api_base_url = url;
        }
        config.api_token = get("QUEST_API_TOKEN");

        if let Some(raw) = get("QUEST_REQUEST_TIMEOUT_SECS") {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| invalid("QUEST_REQUEST_TIMEOUT_SECS", raw.clone(), "expected a positive integer"))?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = get("QUEST_NODE_COUNT") {
            config.node_count = raw
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=12).contains(n))
                .ok_or_else(|| invalid("QUEST_NODE_COUNT", raw.clone(), "expected an integer in 1..=12"))?;
        }

        config.state_dir = get("QUEST_STATE_DIR").map(PathBuf::from);

        if let Some(raw) = get("QUEST_RECONCILE_POLICY") {
            config.reconcile_policy = raw
                .parse()
                .map_err(|reason| invalid("QUEST_RECONCILE_POLICY", raw.clone(), reason))?;
        }

        Ok(config)
    }
}

fn invalid(var: &'static str, value: String, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value,
        reason: reason.into(),
    }
}
