//! Agent HTTP API, the only channel between the shell and the monitoring agent.
//!
//! `AgentApi` is the seam the readiness probe, the alert poller and the UI
//! commands talk to; `AgentClient` is the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::types::{AgentConfigUpdate, AlertEvent, AlertsResponse, LogsResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[async_trait]
pub trait AgentApi: Send + Sync {
    /// `GET /api/status`
    async fn status(&self, timeout: Duration) -> Result<serde_json::Value, AgentError>;

    /// `GET /api/alerts`
    async fn alerts(&self, timeout: Duration) -> Result<AlertsResponse, AgentError>;

    /// `GET /api/logs?level=..&limit=..`
    async fn logs(&self, level: Option<&str>, limit: u32) -> Result<LogsResponse, AgentError>;

    /// `POST /api/config`
    async fn apply_config(
        &self,
        update: &AgentConfigUpdate,
    ) -> Result<serde_json::Value, AgentError>;

    async fn active_alerts(&self, timeout: Duration) -> Result<Vec<AlertEvent>, AgentError> {
        Ok(self.alerts(timeout).await?.active)
    }
}

pub struct AgentClient {
    base_url: String,
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::builder()
                .user_agent(format!("third-eye-shell/{}", env!("CARGO_PKG_VERSION")))
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T>(
        &self,
        path: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, AgentError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        if !response.status().is_success() {
            return Err(AgentError::Status(response.status().as_u16()));
        }

        response.json::<T>().await.map_err(|e| classify(e, timeout))
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> AgentError {
    if err.is_timeout() {
        AgentError::Timeout(timeout.as_millis())
    } else {
        AgentError::Http(err)
    }
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn status(&self, timeout: Duration) -> Result<serde_json::Value, AgentError> {
        self.get_json("/api/status", &[], timeout).await
    }

    async fn alerts(&self, timeout: Duration) -> Result<AlertsResponse, AgentError> {
        self.get_json("/api/alerts", &[], timeout).await
    }

    async fn logs(&self, level: Option<&str>, limit: u32) -> Result<LogsResponse, AgentError> {
        let mut query = Vec::with_capacity(2);
        if let Some(level) = level.filter(|l| !l.is_empty()) {
            query.push(("level", level.to_string()));
        }
        query.push(("limit", limit.to_string()));
        self.get_json("/api/logs", &query, DEFAULT_TIMEOUT).await
    }

    async fn apply_config(
        &self,
        update: &AgentConfigUpdate,
    ) -> Result<serde_json::Value, AgentError> {
        update.validate().map_err(AgentError::InvalidConfig)?;

        let response = self
            .http
            .post(self.url("/api/config"))
            .json(update)
            .send()
            .await
            .map_err(|e| classify(e, DEFAULT_TIMEOUT))?;

        if !response.status().is_success() {
            return Err(AgentError::Status(response.status().as_u16()));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| classify(e, DEFAULT_TIMEOUT))?;

        // The agent answers 200 with {"ok":false,"error":..} when it refuses a change.
        if body["ok"].as_bool() == Some(false) {
            let reason = body["error"].as_str().unwrap_or("unknown error").to_string();
            return Err(AgentError::Rejected(reason));
        }

        Ok(body)
    }
}
