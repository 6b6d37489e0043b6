//! In-memory fakes for the transport trait (testing only)
//!
//! [`ScriptedTransport`] replays a fixed script of chunks, failures, delays
//! and stalls without touching the network, and records whether the chunk
//! stream it handed out has been released.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::{ClientError, Result};
use crate::request::AnalysisRequest;
use crate::transport::{ChunkStream, StreamTransport};

/// One scripted step of a response body.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver these bytes as one chunk.
    Chunk(Vec<u8>),
    /// Fail the body stream with a transport error.
    Fail(String),
    /// Wait before the next step.
    Delay(Duration),
    /// Never produce anything again; the connection stays open.
    Hang,
}

/// Scripted [`StreamTransport`].
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: Vec<Step>,
    rejection: Option<(u16, String)>,
    open_delay: Option<Duration>,
    opened: AtomicUsize,
    released: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// One chunk per line, each terminated by `\n`.
    pub fn from_lines(lines: &[&str]) -> Self {
        Self::new(
            lines
                .iter()
                .map(|line| Step::Chunk(format!("{line}\n").into_bytes()))
                .collect(),
        )
    }

    /// The whole body as one string, cut into chunks at the given byte offsets.
    pub fn split_at(body: &str, cuts: &[usize]) -> Self {
        let bytes = body.as_bytes();
        let mut steps = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            let cut = cut.clamp(start, bytes.len());
            steps.push(Step::Chunk(bytes[start..cut].to_vec()));
            start = cut;
        }
        steps.push(Step::Chunk(bytes[start..].to_vec()));
        Self::new(steps)
    }

    /// Respond with a non-2xx status instead of a body.
    pub fn rejecting(status: u16, detail: &str) -> Self {
        Self {
            rejection: Some((status, detail.to_string())),
            ..Self::default()
        }
    }

    /// Append a stall so the stream stays open after the script.
    pub fn then_hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// Delay the response headers.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Number of times `open` was called.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether a stream was handed out and has since been dropped or ended.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct ReleaseGuard(Arc<AtomicBool>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open(&self, _request: &AnalysisRequest) -> Result<ChunkStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, detail)) = &self.rejection {
            return Err(ClientError::Status {
                status: *status,
                detail: detail.clone(),
            });
        }

        let guard = ReleaseGuard(Arc::clone(&self.released));
        let steps = self.steps.clone().into_iter();

        Ok(futures::stream::unfold((steps, guard), |(mut steps, guard)| async move {
            loop {
                let step = match steps.next() {
                    Some(step) => step,
                    None => return None,
                };
                match step {
                    Step::Chunk(bytes) => return Some((Ok(bytes), (steps, guard))),
                    Step::Fail(message) => {
                        return Some((Err(ClientError::Http(message)), (steps, guard)))
                    }
                    Step::Delay(delay) => tokio::time::sleep(delay).await,
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        })
        .boxed())
    }
}
