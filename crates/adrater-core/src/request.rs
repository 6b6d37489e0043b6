//! Analysis request model and its multipart encoding.

use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Serialize;

use crate::error::{ClientError, Result};

/// Largest asset the service accepts (10 MiB).
pub const MAX_ASSET_BYTES: usize = 10 * 1024 * 1024;

/// Where the ad creative comes from. Exactly one source per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdSource {
    /// Uploaded image bytes.
    Asset {
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
    /// Publicly reachable ad URL.
    Url(String),
}

impl AdSource {
    /// Short human label, e.g. for transcripts and logs.
    pub fn label(&self) -> &str {
        match self {
            AdSource::Asset { file_name, .. } => file_name,
            AdSource::Url(url) => url,
        }
    }
}

/// Immutable description of one analysis job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    source: AdSource,
    landing_page_url: String,
    brand_guidelines: Option<String>,
    target_audience: Option<String>,
    campaign_goal: Option<String>,
}

impl AnalysisRequest {
    /// Validate and build a request.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidRequest` when the landing page URL is
    /// missing or not http(s), when a URL source does not parse, or when an
    /// asset is empty, too large, or not an image.
    pub fn new(source: AdSource, landing_page_url: impl Into<String>) -> Result<Self> {
        let landing_page_url = landing_page_url.into().trim().to_string();
        check_http_url("landing_page_url", &landing_page_url)?;

        match &source {
            AdSource::Url(url) => check_http_url("ad_url", url)?,
            AdSource::Asset {
                content_type,
                bytes,
                ..
            } => {
                if bytes.is_empty() {
                    return Err(ClientError::InvalidRequest("ad asset is empty".into()));
                }
                if bytes.len() > MAX_ASSET_BYTES {
                    return Err(ClientError::InvalidRequest(format!(
                        "ad asset is {:.1}MB, maximum is 10MB",
                        bytes.len() as f64 / (1024.0 * 1024.0)
                    )));
                }
                if !content_type.starts_with("image/") {
                    return Err(ClientError::InvalidRequest(format!(
                        "ad asset must be an image, got {content_type}"
                    )));
                }
            }
        }

        Ok(Self {
            source,
            landing_page_url,
            brand_guidelines: None,
            target_audience: None,
            campaign_goal: None,
        })
    }

    /// Attach a free-form brand guideline document (sent verbatim).
    pub fn with_brand_guidelines(mut self, guidelines: impl Into<String>) -> Self {
        self.brand_guidelines = non_blank(guidelines.into());
        self
    }

    pub fn with_target_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = non_blank(audience.into());
        self
    }

    pub fn with_campaign_goal(mut self, goal: impl Into<String>) -> Self {
        self.campaign_goal = non_blank(goal.into());
        self
    }

    pub fn source(&self) -> &AdSource {
        &self.source
    }

    pub fn landing_page_url(&self) -> &str {
        &self.landing_page_url
    }

    pub fn brand_guidelines(&self) -> Option<&str> {
        self.brand_guidelines.as_deref()
    }

    pub fn target_audience(&self) -> Option<&str> {
        self.target_audience.as_deref()
    }

    pub fn campaign_goal(&self) -> Option<&str> {
        self.campaign_goal.as_deref()
    }

    /// Names of the multipart fields this request will send, in order.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = vec!["landing_page_url"];
        names.push(match self.source {
            AdSource::Asset { .. } => "ad_file",
            AdSource::Url(_) => "ad_url",
        });
        if self.brand_guidelines.is_some() {
            names.push("brand_guidelines");
        }
        if self.target_audience.is_some() {
            names.push("target_audience");
        }
        if self.campaign_goal.is_some() {
            names.push("campaign_goal");
        }
        names
    }

    /// Encode as the multipart form accepted by the streaming endpoint.
    pub fn to_multipart(&self) -> Result<Form> {
        let mut form = Form::new().text("landing_page_url", self.landing_page_url.clone());

        form = match &self.source {
            AdSource::Asset {
                file_name,
                content_type,
                bytes,
            } => {
                let part = Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(content_type)?;
                form.part("ad_file", part)
            }
            AdSource::Url(url) => form.text("ad_url", url.clone()),
        };

        if let Some(guidelines) = &self.brand_guidelines {
            form = form.text("brand_guidelines", guidelines.clone());
        }
        if let Some(audience) = &self.target_audience {
            form = form.text("target_audience", audience.clone());
        }
        if let Some(goal) = &self.campaign_goal {
            form = form.text("campaign_goal", goal.clone());
        }

        Ok(form)
    }

    /// JSON body for the non-streaming endpoint, which only accepts URL sources.
    pub fn to_json_body(&self) -> Result<JsonAnalysisBody<'_>> {
        let AdSource::Url(ad_url) = &self.source else {
            return Err(ClientError::InvalidRequest(
                "the non-streaming endpoint requires an ad URL, not an uploaded asset".into(),
            ));
        };

        let brand_guidelines = match &self.brand_guidelines {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        Ok(JsonAnalysisBody {
            ad_url,
            landing_page_url: &self.landing_page_url,
            brand_guidelines,
            target_audience: self.target_audience.as_deref(),
        })
    }
}

/// Wire body of `POST /api/v1/analyze`.
#[derive(Debug, Serialize)]
pub struct JsonAnalysisBody<'a> {
    pub ad_url: &'a str,
    pub landing_page_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand_guidelines: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<&'a str>,
}

fn check_http_url(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ClientError::InvalidRequest(format!("{field} is required")));
    }
    let url = Url::parse(value)
        .map_err(|e| ClientError::InvalidRequest(format!("{field} is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ClientError::InvalidRequest(format!(
            "{field} must be an HTTP/HTTPS URL, got scheme {other}"
        ))),
    }
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
