//! reqwest implementation of [`QuestApi`]

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::api::{QuestApi, Result};
use super::auth::TokenProvider;
use super::dto::*;
use super::error::SyncError;
use crate::config::QuestMapConfig;
use crate::model::{NodePatch, ServerId};

/// HTTP client for the quest backend.
///
/// Sends the bearer token on every request and keeps a cookie store so
/// session cookies travel with it. A 401 triggers one token refresh and a
/// single retry.
pub struct HttpQuestApi {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    timeout_secs: u64,
}

impl HttpQuestApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| SyncError::Unknown(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn from_config(config: &QuestMapConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout, tokens)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and return the raw body of a 2xx response
    async fn execute(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        let url = self.url(path);
        let mut refreshed = false;

        loop {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = self.tokens.access_token().await {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(method = %method, url = %url, "backend request");
            let response = request
                .send()
                .await
                .map_err(|e| SyncError::from_transport(e, self.timeout_secs))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    warn!(url = %url, "still unauthorized after token refresh");
                    return Err(SyncError::AuthenticationRequired);
                }
                info!(url = %url, "unauthorized, refreshing token");
                if let Err(e) = self.tokens.refresh().await {
                    warn!(error = %e, "token refresh failed");
                    return Err(SyncError::AuthenticationRequired);
                }
                refreshed = true;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| SyncError::from_transport(e, self.timeout_secs))?;

            debug!(status = status.as_u16(), url = %url, "backend response");
            if !status.is_success() {
                error!(status = status.as_u16(), url = %url, "backend error: {}", text);
                return Err(http_error(status, &text));
            }
            return Ok(text);
        }
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        let text = self.execute(method, path, body.as_ref()).await?;
        if text.trim().is_empty() {
            return Err(SyncError::NoResponse);
        }
        serde_json::from_str(&text).map_err(|e| {
            error!(path = %path, "failed to parse backend response: {}", e);
            SyncError::from(e)
        })
    }

    async fn call_void<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        self.execute(method, path, body.as_ref()).await.map(|_| ())
    }
}

/// Map a non-2xx response to `HTTP_ERROR`, keeping whatever body came back
fn http_error(status: StatusCode, text: &str) -> SyncError {
    let body = match serde_json::from_str::<Value>(text) {
        Ok(json) => Some(json),
        Err(_) if text.trim().is_empty() => None,
        Err(_) => Some(Value::String(text.to_string())),
    };
    let message = body
        .as_ref()
        .and_then(|b| b.get("detail").or_else(|| b.get("message")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    SyncError::Http {
        status: status.as_u16(),
        message,
        body,
    }
}

#[async_trait]
impl QuestApi for HttpQuestApi {
    async fn create_quest(&self, req: &CreateQuestRequest) -> Result<QuestDescriptor> {
        self.call(Method::POST, "/quests", Some(req)).await
    }

    async fn list_quests(&self) -> Result<Vec<QuestDescriptor>> {
        self.call::<(), _>(Method::GET, "/quests", None).await
    }

    async fn get_quest(&self, quest_id: &str) -> Result<QuestPayload> {
        self.call::<(), _>(Method::GET, &format!("/quests/{}", quest_id), None)
            .await
    }

    async fn delete_quest(&self, quest_id: &str) -> Result<()> {
        self.call_void::<()>(Method::DELETE, &format!("/quests/{}", quest_id), None)
            .await
    }

    async fn generate_nodes(&self, req: &GenerateNodesRequest) -> Result<GenerateNodesResponse> {
        self.call(Method::POST, "/nodes/generate", Some(req)).await
    }

    async fn breakdown_node(&self, node_key: &str, req: &BreakdownRequest) -> Result<BreakdownResponse> {
        self.call(Method::POST, &format!("/nodes/{}/breakdown", node_key), Some(req))
            .await
    }

    async fn expand_node(&self, node_key: &str, req: &ExpandRequest) -> Result<ExpandResponse> {
        self.call(Method::POST, &format!("/nodes/{}/expand", node_key), Some(req))
            .await
    }

    async fn complete_node(&self, node_key: &str, req: &CompleteRequest) -> Result<CompleteResponse> {
        self.call(Method::POST, &format!("/nodes/{}/complete", node_key), Some(req))
            .await
    }

    async fn consult_ai(&self, req: &ConsultRequest) -> Result<ConsultResponse> {
        self.call(Method::POST, "/ai/consult", Some(req)).await
    }

    async fn update_node_position(&self, quest_id: &str, node_id: ServerId, position: &PositionUpdate) -> Result<()> {
        self.call_void(
            Method::PUT,
            &format!("/quests/{}/nodes/{}/position", quest_id, node_id),
            Some(position),
        )
        .await
    }

    async fn update_node(&self, quest_id: &str, node_id: ServerId, patch: &NodePatch) -> Result<()> {
        self.call_void(Method::PUT, &format!("/quests/{}/nodes/{}", quest_id, node_id), Some(patch))
            .await
    }

    async fn delete_node(&self, quest_id: &str, node_id: ServerId) -> Result<()> {
        self.call_void::<()>(Method::DELETE, &format!("/quests/{}/nodes/{}", quest_id, node_id), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::auth::StaticToken;

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpQuestApi::new("http://localhost:8000/api/", Duration::from_secs(60), Arc::new(StaticToken::none()))
            .unwrap();
        assert_eq!(api.url("/quests"), "http://localhost:8000/api/quests");
    }

    #[test]
    fn test_http_error_with_json_detail() {
        let err = http_error(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail": "bad goal"}"#);
        match err {
            SyncError::Http { status, message, body } => {
                assert_eq!(status, 422);
                assert_eq!(message, "bad goal");
                assert!(body.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_http_error_plain_text_body() {
        let err = http_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(
            err,
            SyncError::Http {
                status: 502,
                message: "Bad Gateway".into(),
                body: Some(Value::String("upstream down".into())),
            }
        );
    }
}
