//! # slack-assets-bot CLI
//!
//! Command parsing and process wiring only. The ingestion pipeline lives in
//! `slack-assets-core`; this module builds the Slack and GitHub bindings from the
//! loaded [`AppConfig`](crate::load_config::AppConfig), starts the events endpoint
//! and the dispatch loop, and waits for shutdown.
//!
//! - For command-line users: `slack-assets-bot listen --config bot.yaml`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
use crate::github::GithubClient;
use crate::load_config::{load_config, AppConfig};
use crate::server::{self, EventsState};
use crate::slack::SlackClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slack_assets_core::dispatch::dispatch_events;
use slack_assets_core::ingest::AssetIngestor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Capacity of the queue between the events endpoint and the dispatch loop.
pub const EVENT_QUEUE_CAPACITY: usize = 64;

/// CLI for slack-assets-bot: land zipped assets from Slack as GitHub pull requests.
#[derive(Parser)]
#[clap(
    name = "slack-assets-bot",
    version,
    about = "Turn zip uploads in a Slack channel into GitHub branches, commits and pull requests"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the Slack events endpoint and ingest uploads until shutdown
    Listen {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Listen { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "listen", "Starting slack-assets-bot");
            let cancel = CancellationToken::new();
            tokio::spawn(server::shutdown_signal(cancel.clone()));
            listen(config, cancel).await
        }
    }
}

/// Run the bot with `config` until `cancel` fires, then wait for in-flight runs.
pub async fn listen(config: AppConfig, cancel: CancellationToken) -> Result<()> {
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let messages = SlackClient::new(http.clone(), &config.slack, config.ingest.scratch_dir.clone());
    let repository = Arc::new(GithubClient::new(http, &config.github));
    let ingestor = Arc::new(AssetIngestor::new(
        messages,
        repository,
        config.github.target(),
        config.ingest.clone(),
    ));

    let (sender, receiver) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let tracker = TaskTracker::new();
    let dispatcher = tokio::spawn(dispatch_events(
        receiver,
        ingestor,
        cancel.clone(),
        tracker.clone(),
    ));

    let app = server::router(Arc::new(EventsState::new(
        config.slack.signing_secret.clone(),
        config.slack.channel_id.clone(),
        sender,
    )));
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;

    let served = server::serve(listener, app, cancel.clone()).await;
    // Server gone for whatever reason: stop taking events either way.
    cancel.cancel();

    if let Err(e) = dispatcher.await {
        tracing::error!(error = %e, "Dispatch loop terminated abnormally");
    }
    tracker.close();
    tracing::info!(in_flight = tracker.len(), "Waiting for in-flight ingestion runs");
    tracker.wait().await;
    tracing::info!(command = "listen", "Shutdown complete");

    served
}
