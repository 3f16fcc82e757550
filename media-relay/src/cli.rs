//! This module implements the CLI interface for media-relay: command parsing,
//! wiring of the configured source, downloader and publisher, and the async
//! entrypoint shared by `main` and the integration tests.
//!
//! All pipeline logic lives in the [`media-relay-core`] crate; this module only
//! picks concrete adapters for the configured source and reports the result.
//!
//! ## How To Use
//! - From the shell: `media-relay relay --config relay.yaml`.
//! - Programmatically: call [`run`] with a constructed [`Cli`].
//!
//! [`media-relay-core`]: ../../media-relay-core/

use crate::load_config::{load_config, CliConfig};
use crate::upload::GraphClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use media_relay_core::contract::{MediaDownloader, Publisher, SourceAdapter};
use media_relay_core::download::{Fetcher, YtDlpDownloader};
use media_relay_core::ledger::Ledger;
use media_relay_core::relay::{relay, RelayOutcome, RelayReport};
use media_relay_core::source::{SourceAction, TelegramSource, YtDlpSource};
use std::path::PathBuf;

/// CLI for media-relay: republish new source videos to a Facebook Page.
#[derive(Parser)]
#[clap(
    name = "media-relay",
    version,
    about = "Relay new Instagram/YouTube/Telegram videos to a Facebook Page, once each"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one relay batch using the given config file
    Relay {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Relay { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "relay", "Starting relay run");

            let publisher = GraphClient::new_from_env(config.publish.clone())
                .map_err(|e| anyhow::anyhow!("Failed to construct publisher from env: {e}"))?;
            let mut ledger = Ledger::load(&config.relay.ledger_path);

            let report = relay_configured_source(&config, &publisher, &mut ledger).await?;
            summarise(&report);
            Ok(())
        }
    }
}

async fn relay_configured_source<P: Publisher>(
    config: &CliConfig,
    publisher: &P,
    ledger: &mut Ledger,
) -> Result<RelayReport> {
    match &config.source {
        SourceAction::Instagram(ig) => {
            let source = YtDlpSource::new(&ig.profile_url, config.yt_dlp.clone());
            let downloader = YtDlpDownloader::new(config.yt_dlp.clone());
            run_batch(config, &source, downloader, publisher, ledger).await
        }
        SourceAction::Youtube(yt) => {
            let source = YtDlpSource::new(&yt.channel_url, config.yt_dlp.clone());
            let downloader = YtDlpDownloader::new(config.yt_dlp.clone());
            run_batch(config, &source, downloader, publisher, ledger).await
        }
        SourceAction::Telegram(channel) => {
            let token = std::env::var("TELEGRAM_BOT_TOKEN")
                .context("TELEGRAM_BOT_TOKEN environment variable not set")?;
            let source = TelegramSource::new(reqwest::Client::new(), channel, token);
            let downloader = source.downloader();
            run_batch(config, &source, downloader, publisher, ledger).await
        }
    }
}

async fn run_batch<S, D, P>(
    config: &CliConfig,
    source: &S,
    downloader: D,
    publisher: &P,
    ledger: &mut Ledger,
) -> Result<RelayReport>
where
    S: SourceAdapter,
    D: MediaDownloader,
    P: Publisher,
{
    let fetcher = Fetcher::new(downloader, config.fetch.clone());
    match relay(&config.relay, source, &fetcher, publisher, ledger).await {
        Ok(report) => Ok(report),
        Err(e) => {
            tracing::error!(command = "relay", error = %e, "Relay run failed");
            Err(anyhow::Error::new(e).context("Relay run aborted"))
        }
    }
}

fn summarise(report: &RelayReport) {
    for item in &report.items {
        match &item.outcome {
            RelayOutcome::Success { remote_id } => {
                tracing::info!(item_id = %item.item_id, remote_id = %remote_id, "Relayed")
            }
            RelayOutcome::Skipped { reason } => {
                tracing::info!(item_id = %item.item_id, ?reason, "Skipped")
            }
            RelayOutcome::Failed { error } => {
                tracing::warn!(item_id = %item.item_id, error = %error, "Failed")
            }
        }
    }
    println!(
        "Relay complete: {} relayed, {} failed, {} skipped.",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
}
