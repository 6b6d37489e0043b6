//! Classification of frame payloads into stream events.
//!
//! Classification is total: every payload maps to a [`StreamEvent`]. Payloads
//! that are not JSON, lack a usable `type`, carry an unknown `type`, or hold a
//! `data` value of the wrong shape all become [`StreamEvent::Heartbeat`]. A
//! `result` only needs non-null `data`; its shape is not the classifier's
//! concern.

use serde::Deserialize;
use serde_json::Value;

use crate::report::ReportPayload;

/// A classified frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// One line of remote agent progress.
    Log(String),
    /// Terminal success payload.
    Result(ReportPayload),
    /// Terminal failure reported by the service.
    Error(String),
    /// Keep-alive, unknown, or malformed frame. Carries nothing.
    Heartbeat,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Log(_) => "log",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
            StreamEvent::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Why a payload was reduced to a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// `type` was `heartbeat`.
    KeepAlive,
    /// Not a JSON object with a string `type`.
    Malformed,
    /// A `type` this client does not handle.
    UnknownType,
    /// Known `type` with a `data` value of the wrong shape.
    BadData,
}

/// Classify one frame payload.
pub fn classify(payload: &str) -> StreamEvent {
    classify_detailed(payload).unwrap_or(StreamEvent::Heartbeat)
}

/// Like [`classify`], but reports why a frame carried nothing actionable.
pub fn classify_detailed(payload: &str) -> Result<StreamEvent, DropReason> {
    let wire: WireEvent = serde_json::from_str(payload).map_err(|_| DropReason::Malformed)?;

    match wire.kind.as_str() {
        "log" => text_data(wire.data).map(StreamEvent::Log),
        "error" => text_data(wire.data).map(StreamEvent::Error),
        "result" => wire
            .data
            .and_then(ReportPayload::from_data)
            .map(StreamEvent::Result)
            .ok_or(DropReason::BadData),
        "heartbeat" => Err(DropReason::KeepAlive),
        _ => Err(DropReason::UnknownType),
    }
}

fn text_data(data: Option<Value>) -> Result<String, DropReason> {
    match data {
        Some(Value::String(text)) => Ok(text),
        _ => Err(DropReason::BadData),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        assert_eq!(
            classify(r#"{"type": "log", "data": "Crew started"}"#),
            StreamEvent::Log("Crew started".to_string())
        );
    }

    #[test]
    fn test_error_event() {
        assert_eq!(
            classify(r#"{"type": "error", "data": "Gemini quota exceeded"}"#),
            StreamEvent::Error("Gemini quota exceeded".to_string())
        );
    }

    #[test]
    fn test_result_event() {
        let event = classify(r#"{"type": "result", "data": {"overall_score": 64.0}}"#);
        match event {
            StreamEvent::Result(payload) => assert_eq!(payload.overall_score(), Some(64.0)),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[test]
    fn test_result_event_with_string_data() {
        let event = classify(r#"{"type": "result", "data": "{\"overall_score\": 12.5}"}"#);
        assert!(matches!(event, StreamEvent::Result(p) if p.overall_score() == Some(12.5)));
    }

    #[test]
    fn test_result_event_with_markdown_text() {
        let event = classify(
            r###"{"type": "result", "data": "## Ad Quality Report\n\nOverall: 72/100"}"###,
        );
        assert_eq!(
            event,
            StreamEvent::Result(ReportPayload::Text(
                "## Ad Quality Report\n\nOverall: 72/100".to_string()
            ))
        );
    }

    #[test]
    fn test_result_event_without_score_is_kept() {
        let event = classify(r#"{"type": "result", "data": {"summary": "fine"}}"#);
        assert!(matches!(event, StreamEvent::Result(ReportPayload::Raw(_))));
    }

    #[test]
    fn test_heartbeat_and_noise_never_fail() {
        assert_eq!(
            classify_detailed(r#"{"type": "heartbeat"}"#),
            Err(DropReason::KeepAlive)
        );
        assert_eq!(classify_detailed("not json"), Err(DropReason::Malformed));
        assert_eq!(classify_detailed(""), Err(DropReason::Malformed));
        assert_eq!(classify_detailed("[1, 2]"), Err(DropReason::Malformed));
        assert_eq!(
            classify_detailed(r#"{"data": "no type"}"#),
            Err(DropReason::Malformed)
        );
        assert_eq!(
            classify_detailed(r#"{"type": "done"}"#),
            Err(DropReason::UnknownType)
        );
        assert_eq!(
            classify_detailed(r#"{"type": "log", "data": 5}"#),
            Err(DropReason::BadData)
        );
        assert_eq!(
            classify_detailed(r#"{"type": "result", "data": null}"#),
            Err(DropReason::BadData)
        );
        assert_eq!(
            classify_detailed(r#"{"type": "result"}"#),
            Err(DropReason::BadData)
        );
        assert_eq!(classify(r#"{"type": "error"}"#), StreamEvent::Heartbeat);
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(StreamEvent::Error("x".into()).kind(), "error");
        assert_eq!(StreamEvent::Log("x".into()).kind(), "log");
        assert_eq!(StreamEvent::Heartbeat.kind(), "heartbeat");
    }
}
