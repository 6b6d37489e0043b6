//! Structured observability hooks for the session lifecycle.
//!
//! Emits `session.*` events through `tracing`. None of these reach the
//! session observer; they exist for diagnostics only.

use tracing::{debug, info, warn};

use crate::event::DropReason;

/// Span covering one session. Attach it with `tracing::Instrument` so it
/// follows the session future across await points.
pub fn session_span(ad_source: &str) -> tracing::Span {
    tracing::info_span!("adrater.session", ad_source = %ad_source)
}

/// Emit event: session issued its request.
pub fn emit_session_started(ad_source: &str, landing_page_url: &str) {
    info!(
        event = "session.started",
        ad_source = %ad_source,
        landing_page_url = %landing_page_url,
    );
}

/// Emit event: one progress line accepted.
pub fn emit_log_received(seq: u64, text: &str) {
    debug!(event = "session.log", seq = seq, text = %text);
}

/// Emit event: a frame carried nothing actionable.
///
/// Keep-alives are expected and logged at debug; anything else is noise
/// worth a warning but is never surfaced to the user.
pub fn emit_frame_dropped(seq: u64, reason: DropReason, payload: &str) {
    match reason {
        DropReason::KeepAlive => debug!(event = "session.heartbeat", seq = seq),
        reason => warn!(
            event = "session.frame_dropped",
            seq = seq,
            reason = ?reason,
            payload = %payload,
        ),
    }
}

/// Emit event: session reached a terminal state.
pub fn emit_session_finished(
    outcome: &str,
    log_lines: usize,
    discarded_lines: u64,
    duration_ms: u64,
) {
    info!(
        event = "session.finished",
        outcome = %outcome,
        log_lines = log_lines,
        discarded_lines = discarded_lines,
        duration_ms = duration_ms,
    );
}
