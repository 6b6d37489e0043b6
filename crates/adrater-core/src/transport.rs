//! Transport reader: opens the streaming request and yields raw body chunks.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::request::AnalysisRequest;

/// Path of the server-push analysis endpoint.
pub const STREAM_PATH: &str = "/api/v1/analyze/stream";

/// Raw body chunks in arrival order. Dropping the stream releases the
/// underlying connection.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>>>;

/// Source of raw event-stream bytes for one session.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Issue the request and return the body as a chunk stream.
    ///
    /// A non-2xx status must be reported here, before any chunk is produced.
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream>;
}

/// reqwest-backed transport targeting the analysis service.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    /// Build a transport for `config`.
    ///
    /// Only a connect timeout is applied; a session may stream for as long as
    /// the service keeps it open.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: config.endpoint(STREAM_PATH),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &AnalysisRequest) -> Result<ChunkStream> {
        let form = request.to_multipart()?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response).await?;
        debug!(url = %self.url, "event stream opened");

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }
}

/// Pass 2xx responses through; turn anything else into `ClientError::Status`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        detail: error_detail(&body, status.canonical_reason()),
    })
}

const MAX_DETAIL_CHARS: usize = 200;

/// Prefer a JSON `detail` field, then the raw body, then the reason phrase.
fn error_detail(body: &str, reason: Option<&str>) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| match v.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        })
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        return reason.unwrap_or("no detail").to_string();
    }
    if detail.chars().count() > MAX_DETAIL_CHARS {
        let cut: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        return format!("{cut}…");
    }
    detail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_prefers_json_detail() {
        let body = r#"{"detail": "Either ad_url or ad_file must be provided"}"#;
        assert_eq!(
            error_detail(body, Some("Bad Request")),
            "Either ad_url or ad_file must be provided"
        );
    }

    #[test]
    fn test_error_detail_structured_detail() {
        let body = r#"{"detail": [{"loc": ["body", "landing_page_url"]}]}"#;
        assert!(error_detail(body, None).contains("landing_page_url"));
    }

    #[test]
    fn test_error_detail_falls_back_to_body_then_reason() {
        assert_eq!(error_detail("upstream down\n", None), "upstream down");
        assert_eq!(
            error_detail("", Some("Internal Server Error")),
            "Internal Server Error"
        );
        assert_eq!(error_detail("  ", None), "no detail");
    }

    #[test]
    fn test_error_detail_truncates() {
        let long = "x".repeat(500);
        let detail = error_detail(&long, None);
        assert_eq!(detail.chars().count(), MAX_DETAIL_CHARS + 1);
        assert!(detail.ends_with('…'));
    }

    #[test]
    fn test_transport_url() {
        let transport = HttpTransport::new(&ClientConfig::new("http://localhost:9000/")).unwrap();
        assert_eq!(transport.url(), "http://localhost:9000/api/v1/analyze/stream");
    }
}
