//! Session controller: the state machine that owns one streaming analysis.
//!
//! ```text
//! Idle --start--> Running --Result--> Completed
//!                    |  \---Error / transport failure / silent close--> Failed
//!                    \-----cancel()--> Cancelled
//! ```
//!
//! A controller runs at most one session. Every transition is decided under
//! a single lock, so exactly one terminal transition happens no matter how a
//! late frame and `cancel()` race. Observer callbacks run after that lock is
//! released, so an observer may call back into the controller. A log
//! callback is skipped once cancellation has been requested; a terminal
//! callback fires only for the transition that won.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, Instrument};

use crate::error::{ClientError, Result};
use crate::event::{classify_detailed, StreamEvent};
use crate::frame::{FrameDecoder, StreamFrame};
use crate::obs;
use crate::report::ReportPayload;
use crate::request::AnalysisRequest;
use crate::transport::StreamTransport;

/// Failure message when the stream closes without a terminal event.
pub const NO_RESULT_MESSAGE: &str = "no result received";

/// Lifecycle of a controller. Terminal states are never left.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Running,
    Completed(ReportPayload),
    Failed(String),
    Cancelled,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed(_) => "completed",
            SessionState::Failed(_) => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    /// The outcome this state represents, if terminal.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            SessionState::Idle | SessionState::Running => None,
            SessionState::Completed(report) => Some(SessionOutcome::Completed(report.clone())),
            SessionState::Failed(message) => Some(SessionOutcome::Failed(message.clone())),
            SessionState::Cancelled => Some(SessionOutcome::Cancelled),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(ReportPayload),
    Failed(String),
    Cancelled,
}

impl SessionOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            SessionOutcome::Completed(_) => "completed",
            SessionOutcome::Failed(_) => "failed",
            SessionOutcome::Cancelled => "cancelled",
        }
    }
}

/// Ordered, append-only record of progress lines received while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressLog {
    lines: Vec<String>,
}

impl ProgressLog {
    fn append(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Consumer of a session's progress and outcome.
///
/// Per session: `on_log` zero or more times in arrival order, then exactly
/// one of `on_result` / `on_error`, unless the session is cancelled, in which
/// case neither terminal callback fires. Callbacks should return quickly;
/// frame consumption waits on them. They may call any controller method.
pub trait SessionObserver: Send {
    fn on_log(&mut self, text: &str);
    fn on_result(&mut self, report: &ReportPayload);
    fn on_error(&mut self, message: &str);
}

/// Adapter turning three closures into a [`SessionObserver`].
pub struct Callbacks<L, R, E> {
    on_log: L,
    on_result: R,
    on_error: E,
}

impl<L, R, E> Callbacks<L, R, E>
where
    L: FnMut(&str) + Send,
    R: FnMut(&ReportPayload) + Send,
    E: FnMut(&str) + Send,
{
    pub fn new(on_log: L, on_result: R, on_error: E) -> Self {
        Self {
            on_log,
            on_result,
            on_error,
        }
    }
}

impl<L, R, E> SessionObserver for Callbacks<L, R, E>
where
    L: FnMut(&str) + Send,
    R: FnMut(&ReportPayload) + Send,
    E: FnMut(&str) + Send,
{
    fn on_log(&mut self, text: &str) {
        (self.on_log)(text)
    }

    fn on_result(&mut self, report: &ReportPayload) {
        (self.on_result)(report)
    }

    fn on_error(&mut self, message: &str) {
        (self.on_error)(message)
    }
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    progress: ProgressLog,
}

/// Owns the lifecycle of one analysis session.
pub struct SessionController {
    transport: Arc<dyn StreamTransport>,
    inner: Mutex<Inner>,
    cancel_requested: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            transport,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                progress: ProgressLog::default(),
            }),
            cancel_requested: AtomicBool::new(false),
            cancel_tx,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        let mut inner = self.lock();
        self.apply_cancel(&mut inner);
        inner.state.clone()
    }

    /// Snapshot of the progress log.
    pub fn progress(&self) -> ProgressLog {
        self.lock().progress.clone()
    }

    /// Start the session on the tokio runtime and return its task.
    ///
    /// The transition to `Running` happens before this returns, so a
    /// `cancel()` issued right after is always honoured. The task yields the
    /// outcome together with the observer.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SessionUnavailable` if this controller has
    /// already started (or been cancelled).
    pub fn start<O>(
        self: &Arc<Self>,
        request: AnalysisRequest,
        mut observer: O,
    ) -> Result<JoinHandle<(SessionOutcome, O)>>
    where
        O: SessionObserver + 'static,
    {
        self.begin()?;
        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let outcome = controller.drive(request, &mut observer).await;
            (outcome, observer)
        }))
    }

    /// Run the session to completion on the current task.
    ///
    /// # Errors
    ///
    /// Same rejection rule as [`SessionController::start`]. Every failure of
    /// the session itself is reported through the observer and the returned
    /// [`SessionOutcome`], never as `Err`.
    pub async fn run<O>(&self, request: AnalysisRequest, observer: &mut O) -> Result<SessionOutcome>
    where
        O: SessionObserver + ?Sized,
    {
        self.begin()?;
        Ok(self.drive(request, observer).await)
    }

    /// Cancel the session. Idempotent; a no-op once a terminal state is set.
    ///
    /// Safe to call from any thread, and from inside an observer callback.
    pub fn cancel(&self) {
        if self.cancel_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.inner.try_lock() {
            Ok(mut inner) => self.apply_cancel(&mut inner),
            Err(TryLockError::Poisoned(poisoned)) => self.apply_cancel(&mut poisoned.into_inner()),
            // Another thread holds the lock briefly; the flag is honoured by
            // the next transition and before the next log callback.
            Err(TryLockError::WouldBlock) => {}
        }

        self.cancel_tx.send_replace(true);
        debug!("session cancellation requested");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_cancel(&self, inner: &mut Inner) {
        if self.cancel_requested.load(Ordering::SeqCst) && !inner.state.is_terminal() {
            inner.state = SessionState::Cancelled;
        }
    }

    fn begin(&self) -> Result<()> {
        let mut inner = self.lock();
        self.apply_cancel(&mut inner);
        if !matches!(inner.state, SessionState::Idle) {
            return Err(ClientError::SessionUnavailable {
                state: inner.state.name(),
            });
        }
        inner.state = SessionState::Running;
        Ok(())
    }

    async fn drive<O>(&self, request: AnalysisRequest, observer: &mut O) -> SessionOutcome
    where
        O: SessionObserver + ?Sized,
    {
        let span = obs::session_span(request.source().label());
        async move {
            let started = Instant::now();
            obs::emit_session_started(request.source().label(), request.landing_page_url());

            let mut decoder = FrameDecoder::new();
            let outcome = self.pump(&request, &mut decoder, observer).await;

            obs::emit_session_finished(
                outcome.name(),
                self.lock().progress.len(),
                decoder.discarded_lines(),
                started.elapsed().as_millis() as u64,
            );
            outcome
        }
        .instrument(span)
        .await
    }

    async fn pump<O>(
        &self,
        request: &AnalysisRequest,
        decoder: &mut FrameDecoder,
        observer: &mut O,
    ) -> SessionOutcome
    where
        O: SessionObserver + ?Sized,
    {
        let mut cancel_rx = self.cancel_tx.subscribe();

        // Dropping the pending request or the chunk stream on any return
        // below releases the connection.
        let opened = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => return self.settle(),
            opened = self.transport.open(request) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => return self.fail(observer, err.to_string()),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => return self.settle(),
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    for frame in decoder.push(&chunk) {
                        if let Some(outcome) = self.dispatch(frame, observer) {
                            return outcome;
                        }
                    }
                }
                Some(Err(err)) => return self.fail(observer, err.to_string()),
                None => {
                    if let Some(frame) = decoder.finish() {
                        if let Some(outcome) = self.dispatch(frame, observer) {
                            return outcome;
                        }
                    }
                    return self.fail(observer, NO_RESULT_MESSAGE.to_string());
                }
            }
        }
    }

    /// Apply one frame. Returns the outcome once the session is terminal.
    ///
    /// The transition is made under the lock; the callback runs after it is
    /// released.
    fn dispatch<O>(&self, frame: StreamFrame, observer: &mut O) -> Option<SessionOutcome>
    where
        O: SessionObserver + ?Sized,
    {
        let event = match classify_detailed(&frame.payload) {
            Ok(event) => event,
            Err(reason) => {
                obs::emit_frame_dropped(frame.seq, reason, &frame.payload);
                return None;
            }
        };
        trace!(seq = frame.seq, kind = event.kind(), "frame classified");

        {
            let mut inner = self.lock();
            self.apply_cancel(&mut inner);
            if !matches!(inner.state, SessionState::Running) {
                return inner.state.outcome();
            }
            match &event {
                StreamEvent::Log(text) => inner.progress.append(text.clone()),
                StreamEvent::Result(report) => {
                    inner.state = SessionState::Completed(report.clone());
                }
                StreamEvent::Error(message) => {
                    inner.state = SessionState::Failed(message.clone());
                }
                StreamEvent::Heartbeat => {}
            }
        }

        match event {
            StreamEvent::Log(text) => {
                obs::emit_log_received(frame.seq, &text);
                if self.cancel_requested.load(Ordering::SeqCst) {
                    return Some(self.settle());
                }
                observer.on_log(&text);
                None
            }
            StreamEvent::Result(report) => {
                observer.on_result(&report);
                Some(SessionOutcome::Completed(report))
            }
            StreamEvent::Error(message) => {
                observer.on_error(&message);
                Some(SessionOutcome::Failed(message))
            }
            StreamEvent::Heartbeat => None,
        }
    }

    fn fail<O>(&self, observer: &mut O, message: String) -> SessionOutcome
    where
        O: SessionObserver + ?Sized,
    {
        {
            let mut inner = self.lock();
            self.apply_cancel(&mut inner);
            if let Some(outcome) = inner.state.outcome() {
                return outcome;
            }
            inner.state = SessionState::Failed(message.clone());
        }

        observer.on_error(&message);
        SessionOutcome::Failed(message)
    }

    fn settle(&self) -> SessionOutcome {
        let mut inner = self.lock();
        self.apply_cancel(&mut inner);
        inner.state.outcome().unwrap_or(SessionOutcome::Cancelled)
    }
}

/// Resolves once cancellation has been requested.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedTransport;
    use crate::request::AdSource;

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(
            AdSource::Url("https://cdn.example.com/ad.png".into()),
            "https://example.com/landing",
        )
        .unwrap()
    }

    #[derive(Default)]
    struct Counting {
        logs: usize,
        terminal: usize,
    }

    impl SessionObserver for Counting {
        fn on_log(&mut self, _text: &str) {
            self.logs += 1;
        }
        fn on_result(&mut self, _report: &ReportPayload) {
            self.terminal += 1;
        }
        fn on_error(&mut self, _message: &str) {
            self.terminal += 1;
        }
    }

    #[test]
    fn test_state_names_and_terminality() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert_eq!(SessionState::Failed("x".into()).name(), "failed");
    }

    #[test]
    fn test_cancel_while_idle_blocks_start() {
        let controller = SessionController::new(Arc::new(ScriptedTransport::new(vec![])));
        controller.cancel();
        assert_eq!(controller.state(), SessionState::Cancelled);
        assert!(matches!(
            controller.begin(),
            Err(ClientError::SessionUnavailable { state: "cancelled" })
        ));
    }

    #[tokio::test]
    async fn test_progress_log_preserves_order() {
        let transport = ScriptedTransport::from_lines(&[
            r#"data: {"type": "log", "data": "one"}"#,
            r#"data: {"type": "log", "data": "two"}"#,
            r#"data: {"type": "error", "data": "boom"}"#,
        ]);
        let controller = SessionController::new(Arc::new(transport));
        let mut observer = Counting::default();

        let outcome = controller.run(request(), &mut observer).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Failed("boom".into()));
        assert_eq!(controller.progress().lines(), ["one", "two"]);
        assert_eq!((observer.logs, observer.terminal), (2, 1));
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let controller = SessionController::new(Arc::new(ScriptedTransport::new(vec![])));
        let mut observer = Counting::default();

        let first = controller.run(request(), &mut observer).await.unwrap();
        assert_eq!(first, SessionOutcome::Failed(NO_RESULT_MESSAGE.into()));

        let err = controller.run(request(), &mut observer).await.unwrap_err();
        assert!(matches!(err, ClientError::SessionUnavailable { state: "failed" }));
        assert_eq!(observer.terminal, 1);
    }
}
