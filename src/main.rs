//! SiteWatch - Construction-Site Safety Intelligence
//!
//! Analyses site video for PPE violations, cites the applicable regulations,
//! scores the risk, writes a report and raises alerts.
//!
//! # Usage
//!
//! ```bash
//! # Analyse one video and print the run summary (relative paths are also
//! # looked up under `paths.input_dir`)
//! sitewatch analyze site_walk.mp4
//!
//! # Print each stage as it completes, then the summary as JSON
//! sitewatch analyze data/input/site_walk.mp4 --stream --json
//!
//! # Serve the HTTP API
//! sitewatch serve --addr 0.0.0.0:8080
//!
//! # Validate configuration and credentials
//! sitewatch check-config
//! ```
//!
//! # Environment Variables
//!
//! - `SITEWATCH_CONFIG`: path to a TOML config file (default: `./sitewatch.toml`)
//! - `ROBOFLOW_API_KEY`, `LLM_API_KEY`: collaborator credentials
//! - `QDRANT_URL`, `EMBEDDINGS_URL`, `LLM_API_URL`: collaborator endpoints
//! - `SLACK_WEBHOOK_URL`, `ALERT_WEBHOOK_URL`: alert channels
//! - `RUST_LOG`: log filter (default: `project.log_level`)

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sitewatch::api::{create_app, ApiState};
use sitewatch::config::{self, SiteConfig};
use sitewatch::pipeline::{PipelineState, RunSummary, SafetyPipeline};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(about = "SiteWatch Construction-Site Safety Intelligence")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the six-stage safety pipeline over one video
    Analyze {
        /// Path to the video file
        video: String,
        /// Print each stage as soon as it completes
        #[arg(long)]
        stream: bool,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Override the listen address (default: server.addr)
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Load and validate configuration, including credentials
    CheckConfig,
}

// ============================================================================
// Startup
// ============================================================================

/// Logs go to stderr so `--json` output on stdout stays machine-readable.
fn init_logging(default_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Ctrl+C cancels the returned token.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, shutting down");
        trigger.cancel();
    });
    token
}

fn build_pipeline() -> Result<Arc<SafetyPipeline>> {
    let pipeline = SafetyPipeline::from_config(config::get()).context("Failed to build safety pipeline")?;
    Ok(Arc::new(pipeline))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_analyze(video: &str, stream: bool, json: bool) -> Result<()> {
    let pipeline = build_pipeline()?;
    let cancel = shutdown_token();
    let video = config::get().paths.resolve_video(video).to_string_lossy().into_owned();
    let video = video.as_str();

    let summary = if stream {
        stream_analyze(&pipeline, video, &cancel).await?
    } else {
        pipeline
            .run_with_cancel(video, &cancel)
            .await
            .with_context(|| format!("Safety analysis failed for {video}"))?
            .summary()
    };

    if json {
        let out = serde_json::to_string_pretty(&summary).context("Failed to serialise run summary")?;
        println!("{out}");
    } else {
        print_summary(&summary);
    }
    Ok(())
}

async fn stream_analyze(
    pipeline: &Arc<SafetyPipeline>,
    video: &str,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let mut updates = pipeline.stream(video);
    let mut state = PipelineState::new(video);

    loop {
        let next = tokio::select! {
            next = updates.next() => next,
            () = cancel.cancelled() => anyhow::bail!("Safety analysis cancelled"),
        };
        let Some(update) = next else { break };
        let update = update.with_context(|| format!("Safety analysis failed for {video}"))?;

        eprintln!("  [{}] {} ({} ms)", update.run_id, update.stage, update.elapsed_ms);
        state.run_id = update.run_id;
        state = state.apply(update.delta);
    }

    Ok(state.summary())
}

fn print_summary(summary: &RunSummary) {
    let a = &summary.risk_assessment;
    println!();
    println!("  Run:         {}", summary.run_id);
    println!("  Video:       {}", summary.video_path);
    println!("  Frames:      {}", summary.frames_processed);
    println!("  Detections:  {}", summary.detection_stats.total);
    println!("  Regulations: {}", summary.regulations.len());
    println!("  Risk score:  {}/100 ({})", a.risk_score, a.alert_level);
    for v in &a.violations {
        println!("    - {} (confidence {:.0}%)", v.kind, v.confidence * 100.0);
    }
    match &summary.final_report {
        Some(path) => println!("  Report:      {}", path.display()),
        None => println!("  Report:      not written"),
    }
    if summary.alerts_sent.is_empty() {
        println!("  Alerts:      none sent");
    } else {
        println!("  Alerts:      {}", summary.alerts_sent.join(", "));
    }
    println!("  Total time:  {} ms", summary.total_ms);
    println!();
}

async fn run_serve(addr: Option<String>) -> Result<()> {
    let pipeline = build_pipeline()?;
    let addr = addr.unwrap_or_else(|| config::get().server.addr.clone());
    let app = create_app(ApiState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(addr = %addr, "HTTP server listening");

    let cancel = shutdown_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("HTTP server shut down");
    Ok(())
}

fn run_check_config() -> Result<()> {
    let site = config::get();
    site.validate().context("Configuration is invalid")?;
    site.require_credentials().context("Configuration is incomplete")?;

    println!("  Configuration OK");
    println!("  Project:      {}", site.project.name);
    println!("  Detector:     {}/{}", site.detector.project, site.detector.version);
    println!("  Vector index: {} ({})", site.vector_index.url, site.vector_index.collection);
    println!("  Model:        {}", site.model.model_id);
    println!("  Input dir:    {}", site.paths.input_dir.display());
    println!("  Reports dir:  {}", site.paths.reports_dir.display());
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Ignoring unreadable .env file: {e}");
        }
    }

    let site = SiteConfig::load();
    init_logging(&site.project.log_level, args.json_logs);
    info!(project = %site.project.name, "SiteWatch starting");
    config::init(site);

    match args.command {
        SubCommand::Analyze { video, stream, json } => run_analyze(&video, stream, json).await,
        SubCommand::Serve { addr } => run_serve(addr).await,
        SubCommand::CheckConfig => run_check_config(),
    }
    .inspect_err(|e| warn!(error = %e, "Command failed"))
}
