//! `load_config` module: Loads a static YAML config and resolves it, together with environment overrides, into plain values for the core.
//!
//! This module is the only place where user-supplied YAML is parsed and mapped to strongly-typed structs.
//!
//! # Responsibilities
//! - Parse the YAML file into the core's config types (`RelayConfig`, `RetryPolicy`, `PublishPolicy`, `SourceAction`)
//! - Apply the `MAX_RESULTS` environment override to the batch limit
//! - Produce clear diagnostics for any failure; errors surface at the CLI boundary
//!
//! Secrets (page token, bot token) are not part of the file. They are read from the
//! environment when the corresponding client is built.
//!
//! The accepted schema is the shape of [`CliConfig`].

use anyhow::Result;
use media_relay_core::config::{PublishPolicy, RelayConfig, RetryPolicy};
use media_relay_core::download::YtDlpOptions;
use media_relay_core::source::SourceAction;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub source: SourceAction,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub fetch: RetryPolicy,
    #[serde(default)]
    pub yt_dlp: YtDlpOptions,
    #[serde(default)]
    pub publish: PublishPolicy,
}

impl CliConfig {
    pub fn trace_loaded(&self) {
        self.source.trace_loaded();
        self.relay.trace_loaded();
        info!(
            retries = self.fetch.retries,
            backoff_secs = self.fetch.backoff_secs,
            timeout_secs = self.fetch.timeout_secs,
            "Loaded fetch RetryPolicy"
        );
        self.publish.trace_loaded();
    }
}

/// Loads the YAML config file at `path` and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(raw) = std::env::var("MAX_RESULTS") {
        let limit = match raw.trim().parse::<usize>() {
            Ok(limit) if limit > 0 => limit,
            _ => {
                error!(var = %raw, "MAX_RESULTS must be a positive integer");
                anyhow::bail!("MAX_RESULTS must be a positive integer, got {raw:?}");
            }
        };
        info!(limit, "Batch limit overridden by MAX_RESULTS");
        config.relay.batch_limit = limit;
    }

    if config.relay.batch_limit == 0 {
        anyhow::bail!("relay.batch_limit must be at least 1");
    }

    config.trace_loaded();
    Ok(config)
}
