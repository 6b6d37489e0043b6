//! Report and response models returned by the analysis service.
//!
//! Decoding is lenient: only `overall_score` is required on a report, and
//! fields this client does not know about are kept in `extra`. A streamed
//! session ends with a [`ReportPayload`], which never fails to decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Three-step scale used for confidence and recommendation priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Level {
    High,
    Medium,
    Low,
}

/// Visual analysis of the ad creative.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VisualAnalysis {
    pub color_palette: Vec<String>,
    pub composition_quality: String,
    pub composition_score: f64,
    pub emotional_tone: String,
    pub cta_visibility: f64,
    pub brand_element_presence: BTreeMap<String, bool>,
}

/// Copy consistency between ad and landing page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CopywritingFeedback {
    pub message_consistency_score: f64,
    pub tone_match: bool,
    pub tone_description: String,
    pub cta_alignment: String,
    pub pain_point_coverage: String,
    pub persuasion_quality: String,
    pub improvement_suggestions: Vec<String>,
}

/// Conformance to the supplied brand guidelines.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrandCompliance {
    pub brand_score: f64,
    pub tone_alignment: String,
    pub visual_alignment: String,
    pub prohibited_elements: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub guideline_coverage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub title: String,
    pub description: String,
    pub priority: Level,
}

/// Structured analysis report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdQualityReport {
    #[serde(default)]
    pub report_id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub ad_url: String,
    #[serde(default)]
    pub landing_page_url: String,

    /// Weighted overall score, 0-100.
    pub overall_score: f64,

    #[serde(default)]
    pub visual_analysis: Option<VisualAnalysis>,
    #[serde(default)]
    pub copywriting_feedback: Option<CopywritingFeedback>,
    #[serde(default)]
    pub brand_compliance: Option<BrandCompliance>,

    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub processing_time_seconds: f64,
    #[serde(default)]
    pub confidence_level: Option<Level>,

    /// Free-form score calculation, keyed by dimension.
    #[serde(default)]
    pub score_breakdown: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,

    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_success() -> bool {
    true
}

/// Terminal payload of a streamed session.
///
/// The service usually sends the finished analysis as Markdown text. Older
/// deployments send the report object or a JSON string encoding it. Any other
/// non-null value is carried through untouched.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ReportPayload {
    Structured(Box<AdQualityReport>),
    Text(String),
    Raw(Value),
}

impl ReportPayload {
    /// Wrap a `result` event's `data`. Only a missing or null value is rejected.
    pub fn from_data(data: Value) -> Option<Self> {
        match data {
            Value::Null => None,
            Value::Object(_) => Some(match AdQualityReport::deserialize(&data) {
                Ok(report) => ReportPayload::Structured(Box::new(report)),
                Err(_) => ReportPayload::Raw(data),
            }),
            Value::String(text) => Some(match serde_json::from_str(text.trim()) {
                Ok(report) => ReportPayload::Structured(Box::new(report)),
                Err(_) => ReportPayload::Text(text),
            }),
            other => Some(ReportPayload::Raw(other)),
        }
    }

    /// The decoded report, when the service sent one.
    pub fn report(&self) -> Option<&AdQualityReport> {
        match self {
            ReportPayload::Structured(report) => Some(report),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ReportPayload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.report().map(|r| r.overall_score)
    }
}

/// Lifecycle of a job on the non-streaming endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failed,
}

/// Body of `POST /api/v1/analyze` and `GET /api/v1/analysis/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub analysis_id: String,
    pub status: AnalysisStatus,
    #[serde(default)]
    pub report: Option<AdQualityReport>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
