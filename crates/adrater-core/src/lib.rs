//! adrater core library
//!
//! Submits ad-analysis jobs to the Ads Quality Rater service and follows
//! their server-push event stream:
//!
//! - [`transport`]: opens the streaming request and yields raw body chunks
//! - [`frame`]: reassembles `data: ` lines across chunk boundaries
//! - [`event`]: classifies frame payloads into [`StreamEvent`]s
//! - [`session`]: the [`SessionController`] state machine
//! - [`client`]: request/response endpoints and session construction

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fakes;
pub mod frame;
pub mod obs;
pub mod report;
pub mod request;
pub mod session;
pub mod telemetry;
pub mod transport;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use event::{classify, StreamEvent};
pub use frame::{FrameDecoder, StreamFrame};
pub use report::{
    AdQualityReport, AnalysisResponse, AnalysisStatus, BrandCompliance, CopywritingFeedback,
    HealthStatus, Level, Recommendation, ReportPayload, VisualAnalysis,
};
pub use request::{AdSource, AnalysisRequest};
pub use session::{
    Callbacks, ProgressLog, SessionController, SessionObserver, SessionOutcome, SessionState,
    NO_RESULT_MESSAGE,
};
pub use telemetry::init_tracing;
pub use transport::{ChunkStream, HttpTransport, StreamTransport};

/// adrater version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
