//! Conversation-style transcript of one analysis.
//!
//! The transcript holds a user message describing the request and a loading
//! assistant message that collects agent progress. When the session ends the
//! loading message is replaced by a report or an error; a cancelled session
//! simply loses it.

use std::fmt::Write as _;

use adrater_core::{
    AdQualityReport, AdSource, AnalysisRequest, Level, ReportPayload, SessionObserver,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Request { text: String },
    Loading { logs: Vec<String> },
    Report { report: ReportPayload },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub body: MessageBody,
}

impl Message {
    fn new(role: Role, body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            created_at: Utc::now(),
            body,
        }
    }
}

/// Presentation reducer fed by a session's callbacks.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    loading: Option<Uuid>,
    echo: bool,
}

impl Transcript {
    /// `echo` prints each progress line to stderr as it arrives.
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Self::default()
        }
    }

    /// Record the submitted request and open the loading message.
    pub fn begin(&mut self, request: &AnalysisRequest) {
        self.messages.push(Message::new(
            Role::User,
            MessageBody::Request {
                text: describe_request(request),
            },
        ));

        let loading = Message::new(Role::Assistant, MessageBody::Loading { logs: Vec::new() });
        self.loading = Some(loading.id);
        self.messages.push(loading);
    }

    /// Drop the loading message after a cancelled session.
    pub fn cancel(&mut self) {
        if let Some(id) = self.loading.take() {
            self.messages.retain(|m| m.id != id);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    fn loading_mut(&mut self) -> Option<&mut Message> {
        let id = self.loading?;
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Swap the loading message for a final one, keeping its position.
    fn settle(&mut self, body: MessageBody) {
        let Some(id) = self.loading.take() else {
            return;
        };
        let message = Message::new(Role::Assistant, body);
        match self.messages.iter().position(|m| m.id == id) {
            Some(index) => self.messages[index] = message,
            None => self.messages.push(message),
        }
    }

    /// Plain-text rendering of every message.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for message in &self.messages {
            match &message.body {
                MessageBody::Request { text } => {
                    let _ = writeln!(out, "> {text}");
                }
                MessageBody::Loading { logs } => {
                    let _ = writeln!(out, "Analyzing... ({} steps so far)", logs.len());
                }
                MessageBody::Report { report } => out.push_str(&render_payload(report)),
                MessageBody::Error { message } => {
                    let _ = writeln!(out, "Analysis failed: {message}");
                }
            }
        }
        out
    }
}

impl SessionObserver for Transcript {
    fn on_log(&mut self, text: &str) {
        if self.echo {
            eprintln!("  · {text}");
        }
        if let Some(Message {
            body: MessageBody::Loading { logs },
            ..
        }) = self.loading_mut()
        {
            logs.push(text.to_string());
        }
    }

    fn on_result(&mut self, report: &ReportPayload) {
        self.settle(MessageBody::Report {
            report: report.clone(),
        });
    }

    fn on_error(&mut self, message: &str) {
        self.settle(MessageBody::Error {
            message: message.to_string(),
        });
    }
}

fn describe_request(request: &AnalysisRequest) -> String {
    let source = match request.source() {
        AdSource::Asset { file_name, .. } => format!("uploaded ad {file_name}"),
        AdSource::Url(url) => format!("ad at {url}"),
    };
    let mut text = format!(
        "Analyze {source} against {}",
        request.landing_page_url()
    );
    if let Some(audience) = request.target_audience() {
        let _ = write!(text, " for {audience}");
    }
    if let Some(goal) = request.campaign_goal() {
        let _ = write!(text, " (goal: {goal})");
    }
    if request.brand_guidelines().is_some() {
        text.push_str(" with brand guidelines");
    }
    text
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::High => "high",
        Level::Medium => "medium",
        Level::Low => "low",
    }
}

fn render_payload(payload: &ReportPayload) -> String {
    match payload {
        ReportPayload::Structured(report) => render_report(report),
        ReportPayload::Text(text) => format!("{}\n", text.trim_end()),
        ReportPayload::Raw(value) => {
            let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            format!("{json}\n")
        }
    }
}

fn render_report(report: &AdQualityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Overall score: {:.1}/100", report.overall_score);
    if let Some(confidence) = report.confidence_level {
        let _ = writeln!(out, "Confidence: {}", level_name(confidence));
    }

    if let Some(visual) = &report.visual_analysis {
        let _ = writeln!(
            out,
            "Visual: composition {:.0}, CTA visibility {:.0} ({})",
            visual.composition_score, visual.cta_visibility, visual.emotional_tone
        );
    }
    if let Some(copy) = &report.copywriting_feedback {
        let _ = writeln!(
            out,
            "Copy: message consistency {:.0}, tone {}",
            copy.message_consistency_score,
            if copy.tone_match { "matches" } else { "does not match" }
        );
    }
    if let Some(brand) = &report.brand_compliance {
        let _ = writeln!(out, "Brand: {:.0}", brand.brand_score);
    }

    if !report.recommendations.is_empty() {
        out.push_str("Recommendations:\n");
        for rec in &report.recommendations {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                level_name(rec.priority),
                rec.title,
                rec.description
            );
        }
    }
    for warning in &report.warnings {
        let _ = writeln!(out, "warning: {warning}");
    }
    out
}
