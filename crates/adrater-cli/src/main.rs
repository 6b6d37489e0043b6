//! adrater - Ads Quality Rater CLI
//!
//! Submits an ad and its landing page to the analysis service and follows
//! the analysis live.
//!
//! ## Commands
//!
//! - `analyze`: stream a new analysis (Ctrl-C cancels)
//! - `health`: check service health
//! - `get`: fetch a stored analysis by id

mod transcript;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adrater_core::{
    AdSource, AnalysisRequest, ApiClient, ClientConfig, SessionController, SessionOutcome,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{info, warn, Level};

use crate::transcript::Transcript;

#[derive(Parser)]
#[command(name = "adrater")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Ads Quality Rater client", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of the analysis service
    #[arg(long, global = true, env = "ADRATER_API_URL")]
    api_url: Option<String>,

    /// Timeout in seconds for request/response calls
    #[arg(long, global = true, env = "ADRATER_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an ad against its landing page, streaming progress
    Analyze(AnalyzeArgs),

    /// Check service health
    Health,

    /// Fetch a stored analysis
    Get {
        /// Analysis id returned by the service
        id: String,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Landing page the ad points to
    #[arg(long)]
    landing_page_url: String,

    /// Intended audience, free text
    #[arg(long)]
    target_audience: Option<String>,

    /// Campaign goal, e.g. "conversions"
    #[arg(long)]
    campaign_goal: Option<String>,

    /// File with brand guidelines (sent as-is)
    #[arg(long)]
    guidelines: Option<PathBuf>,

    /// Cancel the analysis after this many seconds
    #[arg(long)]
    deadline_secs: Option<u64>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Publicly reachable URL of the ad image
    #[arg(long)]
    ad_url: Option<String>,

    /// Local ad image to upload
    #[arg(long)]
    ad_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    adrater_core::init_tracing(cli.json, level);

    let client = ApiClient::new(client_config(&cli)).context("Failed to build API client")?;

    match cli.command {
        Commands::Analyze(args) => cmd_analyze(&client, &args, cli.json).await,
        Commands::Health => cmd_health(&client, cli.json).await,
        Commands::Get { id } => cmd_get(&client, &id, cli.json).await,
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    let mut config = match &cli.api_url {
        Some(url) => ClientConfig::new(url),
        None => ClientConfig::from_env(),
    };
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    config
}

/// Stream one analysis and print its transcript
async fn cmd_analyze(client: &ApiClient, args: &AnalyzeArgs, json: bool) -> Result<()> {
    let request = build_request(args).await?;
    info!(ad = %request.source().label(), "Starting analysis");

    let mut transcript = Transcript::new(!json);
    transcript.begin(&request);

    let session = client.session();
    let task = session
        .start(request, transcript)
        .context("Failed to start analysis session")?;
    let watcher = spawn_cancel_watcher(
        Arc::clone(&session),
        args.deadline_secs.map(Duration::from_secs),
    );

    let (outcome, mut transcript) = task.await.context("Analysis task failed")?;
    watcher.abort();

    if outcome == SessionOutcome::Cancelled {
        transcript.cancel();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(transcript.messages())?);
    } else {
        print!("{}", transcript.render());
    }

    match outcome {
        SessionOutcome::Completed(_) => Ok(()),
        other => anyhow::bail!("Analysis {}", other.name()),
    }
}

/// Cancel the session on Ctrl-C or once the deadline passes.
fn spawn_cancel_watcher(
    session: Arc<SessionController>,
    deadline: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let expired = async {
            match deadline {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling analysis"),
            _ = expired => warn!(deadline_secs = ?deadline.map(|d| d.as_secs()), "Deadline reached, cancelling analysis"),
        }
        session.cancel();
    })
}

async fn build_request(args: &AnalyzeArgs) -> Result<AnalysisRequest> {
    let source = match (&args.source.ad_url, &args.source.ad_file) {
        (Some(url), _) => AdSource::Url(url.clone()),
        (None, Some(path)) => read_asset(path).await?,
        (None, None) => anyhow::bail!("Either --ad-url or --ad-file is required"),
    };

    let mut request = AnalysisRequest::new(source, args.landing_page_url.as_str())
        .context("Invalid analysis request")?;

    if let Some(path) = &args.guidelines {
        let guidelines = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read guidelines file: {:?}", path))?;
        request = request.with_brand_guidelines(guidelines);
    }
    if let Some(audience) = &args.target_audience {
        request = request.with_target_audience(audience.as_str());
    }
    if let Some(goal) = &args.campaign_goal {
        request = request.with_campaign_goal(goal.as_str());
    }

    Ok(request)
}

async fn read_asset(path: &Path) -> Result<AdSource> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read ad file: {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ad".to_string());

    Ok(AdSource::Asset {
        file_name,
        content_type: guess_content_type(path).to_string(),
        bytes,
    })
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Check service health
async fn cmd_health(client: &ApiClient, json: bool) -> Result<()> {
    let health = client
        .health_check()
        .await
        .with_context(|| format!("Failed to reach {}", client.config().api_url))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        println!("Service: {} ({})", client.config().api_url, health.status);
        for (name, state) in &health.services {
            println!("  {name}: {state}");
        }
        if let Some(error) = &health.error {
            println!("  error: {error}");
        }
    }

    if !health.is_healthy() {
        anyhow::bail!("Service is {}", health.status);
    }
    Ok(())
}

/// Fetch a stored analysis
async fn cmd_get(client: &ApiClient, id: &str, json: bool) -> Result<()> {
    let response = client
        .get_analysis(id)
        .await
        .with_context(|| format!("Failed to fetch analysis {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Analysis {} ({:?})", response.analysis_id, response.status);
    if let Some(report) = &response.report {
        println!("Overall score: {:.1}/100", report.overall_score);
        for rec in &report.recommendations {
            println!("  - {}: {}", rec.title, rec.description);
        }
    }
    if let Some(error) = &response.error {
        println!("Error: {error}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("adrater").chain(args.iter().copied()))
    }

    fn analyze_args(cli: Cli) -> AnalyzeArgs {
        match cli.command {
            Commands::Analyze(args) => args,
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_ad_source_is_exactly_one() {
        assert!(parse(&["analyze", "--landing-page-url", "https://a.example"]).is_err());
        assert!(parse(&[
            "analyze",
            "--landing-page-url",
            "https://a.example",
            "--ad-url",
            "https://cdn.example/ad.png",
            "--ad-file",
            "ad.png",
        ])
        .is_err());
        assert!(parse(&[
            "analyze",
            "--landing-page-url",
            "https://a.example",
            "--ad-url",
            "https://cdn.example/ad.png",
        ])
        .is_ok());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("hero.PNG")), "image/png");
        assert_eq!(guess_content_type(Path::new("a/b.jpeg")), "image/jpeg");
        assert_eq!(
            guess_content_type(Path::new("notes.txt")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_api_url_flag_overrides_env() {
        let cli = parse(&["--api-url", "http://rater.internal:9000/", "health"]).unwrap();
        assert_eq!(client_config(&cli).api_url, "http://rater.internal:9000");
    }

    #[tokio::test]
    async fn test_build_request_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let ad = dir.path().join("banner.png");
        let guidelines = dir.path().join("brand.json");
        std::fs::write(&ad, b"\x89PNG\r\n\x1a\nfake").unwrap();
        std::fs::write(&guidelines, r#"{"tone": "playful"}"#).unwrap();

        let cli = parse(&[
            "analyze",
            "--landing-page-url",
            "https://shop.example.com",
            "--ad-file",
            ad.to_str().unwrap(),
            "--guidelines",
            guidelines.to_str().unwrap(),
            "--campaign-goal",
            "awareness",
        ])
        .unwrap();
        let request = build_request(&analyze_args(cli)).await.unwrap();

        match request.source() {
            AdSource::Asset {
                file_name,
                content_type,
                bytes,
            } => {
                assert_eq!(file_name, "banner.png");
                assert_eq!(content_type, "image/png");
                assert!(bytes.starts_with(b"\x89PNG"));
            }
            other => panic!("unexpected source: {other:?}"),
        }
        assert_eq!(request.brand_guidelines(), Some(r#"{"tone": "playful"}"#));
        assert_eq!(request.campaign_goal(), Some("awareness"));
        assert_eq!(request.target_audience(), None);
    }

    #[tokio::test]
    async fn test_build_request_rejects_non_image_upload() {
        let dir = tempfile::tempdir().unwrap();
        let ad = dir.path().join("ad.txt");
        std::fs::write(&ad, b"not an image").unwrap();

        let cli = parse(&[
            "analyze",
            "--landing-page-url",
            "https://shop.example.com",
            "--ad-file",
            ad.to_str().unwrap(),
        ])
        .unwrap();
        let err = build_request(&analyze_args(cli)).await.unwrap_err();
        assert!(err.to_string().contains("Invalid analysis request"));
    }

    #[tokio::test]
    async fn test_missing_ad_file_is_reported() {
        let cli = parse(&[
            "analyze",
            "--landing-page-url",
            "https://shop.example.com",
            "--ad-file",
            "/nonexistent/adrater/ad.png",
        ])
        .unwrap();
        let err = build_request(&analyze_args(cli)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read ad file"));
    }
}
