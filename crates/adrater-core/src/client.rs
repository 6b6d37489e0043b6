//! API client for the analysis service
//!
//! Request/response calls (`health_check`, `analyze`, `get_analysis`) are
//! bounded by the configured timeout. Streaming analysis goes through a
//! [`SessionController`] obtained from [`ApiClient::session`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::report::{AnalysisResponse, HealthStatus};
use crate::request::AnalysisRequest;
use crate::session::SessionController;
use crate::transport::{check_status, HttpTransport};

/// Client for the analysis service
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http_client: reqwest::Client,
    transport: Arc<HttpTransport>,
}

impl ApiClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;
        let transport = Arc::new(HttpTransport::new(&config)?);

        Ok(ApiClient {
            config,
            http_client,
            transport,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET /health`
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let url = self.config.endpoint("/health");
        debug!(url = %url, "checking service health");

        let response = check_status(self.http_client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// `POST /api/v1/analyze`: run an analysis and wait for the full response.
    ///
    /// Only URL ad sources are accepted by this endpoint.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let body = request.to_json_body()?;
        let url = self.config.endpoint("/api/v1/analyze");
        info!(ad_url = %body.ad_url, "submitting analysis");

        let response = check_status(self.http_client.post(&url).json(&body).send().await?).await?;
        Ok(response.json().await?)
    }

    /// `GET /api/v1/analysis/{id}`
    pub async fn get_analysis(&self, analysis_id: &str) -> Result<AnalysisResponse> {
        let url = self
            .config
            .endpoint(&format!("/api/v1/analysis/{analysis_id}"));

        let response = check_status(self.http_client.get(&url).send().await?).await?;
        Ok(response.json().await?)
    }

    /// A fresh streaming session against this service.
    ///
    /// Each call returns an independent controller with its own connection.
    pub fn session(&self) -> Arc<SessionController> {
        Arc::new(SessionController::new(self.transport.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn test_client_from_config() {
        let client = ApiClient::new(ClientConfig::new("http://127.0.0.1:8000")).unwrap();
        assert_eq!(client.config().api_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn test_sessions_are_independent() {
        let client = ApiClient::new(ClientConfig::new("http://127.0.0.1:8000")).unwrap();
        let first = client.session();
        let second = client.session();

        first.cancel();
        assert_eq!(first.state(), SessionState::Cancelled);
        assert_eq!(second.state(), SessionState::Idle);
    }
}
