//! REST client for the agent backend, behind a mock-injectable trait.

use serde::{Deserialize, Serialize};

use bondlink_core::types::{Agent, AgentId};

pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("{url} answered status {status:?}")]
    Rejected { url: String, status: String },

    #[error("cannot decode response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
}

/// Body of `POST /agents/{id}/start`. Absent fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
}

/// The backend's REST surface.
#[allow(async_fn_in_trait)]
pub trait AgentBackend {
    async fn list_agents(&self) -> Result<Vec<Agent>, BackendError>;
    async fn get_agent(&self, agent: &AgentId) -> Result<Agent, BackendError>;
    async fn create_agent(&self) -> Result<Agent, BackendError>;
    /// Ok only when the backend answered `{"status": "success"}`.
    async fn start_agent(&self, agent: &AgentId, request: &StartRequest) -> Result<(), BackendError>;
    /// Ok only when the backend answered `{"status": "success"}`.
    async fn stop_agent(&self, agent: &AgentId) -> Result<(), BackendError>;
}

/// HTTP implementation of [`AgentBackend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .user_agent(concat!("bondlink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| BackendError::Http {
                url: base_url.clone(),
                source,
            })?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.url(path);
        let response = self.http.get(&url).send().await;
        decode(url, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        let url = self.url(path);
        let response = self.http.post(&url).json(body).send().await;
        decode(url, response).await
    }

    async fn post_expect_success<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), BackendError> {
        let response: StatusResponse = self.post_json(path, body).await?;
        check_status(self.url(path), &response.status)
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    url: String,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, BackendError> {
    let response = response.map_err(|source| BackendError::Http {
        url: url.clone(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            url,
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| BackendError::Decode { url, source })
}

fn check_status(url: String, status: &str) -> Result<(), BackendError> {
    if status == STATUS_SUCCESS {
        Ok(())
    } else {
        Err(BackendError::Rejected {
            url,
            status: status.to_string(),
        })
    }
}

fn agent_path(agent: &AgentId, action: &str) -> String {
    format!("/agents/{}/{action}", agent.as_str())
}

impl AgentBackend for BackendClient {
    async fn list_agents(&self) -> Result<Vec<Agent>, BackendError> {
        self.get_json("/agents").await
    }

    async fn get_agent(&self, agent: &AgentId) -> Result<Agent, BackendError> {
        self.get_json(&format!("/agents/{}", agent.as_str())).await
    }

    async fn create_agent(&self) -> Result<Agent, BackendError> {
        self.post_json("/agents", &serde_json::json!({})).await
    }

    async fn start_agent(&self, agent: &AgentId, request: &StartRequest) -> Result<(), BackendError> {
        self.post_expect_success(&agent_path(agent, "start"), request)
            .await
    }

    async fn stop_agent(&self, agent: &AgentId) -> Result<(), BackendError> {
        self.post_expect_success(&agent_path(agent, "stop"), &serde_json::json!({}))
            .await
    }
}
