//! Materialises one candidate's media as a local file.
//!
//! [`Fetcher`] wraps a single-attempt [`MediaDownloader`] with the retry policy:
//! every attempt is bounded by a timeout, a failed attempt's partial file is
//! removed, and after `retries + 1` failed attempts the last error is returned
//! inside [`FetchError::Exhausted`].
//!
//! Two downloaders are provided:
//! - [`HttpDownloader`] streams a direct media URL to disk chunk by chunk.
//! - [`YtDlpDownloader`] delegates to the `yt-dlp` program for page URLs
//!   (Instagram posts, YouTube videos).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::contract::{CandidateItem, LocalMediaFile, MediaDownloader};
use crate::error::FetchError;

pub struct Fetcher<D> {
    downloader: D,
    policy: RetryPolicy,
}

impl<D: MediaDownloader> Fetcher<D> {
    pub fn new(downloader: D, policy: RetryPolicy) -> Self {
        Self { downloader, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `item` into `destination`, retrying transient failures.
    ///
    /// On final failure nothing is left at `destination`.
    pub async fn fetch(
        &self,
        item: &CandidateItem,
        destination: &Path,
    ) -> Result<LocalMediaFile, FetchError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(item_id = %item.id, attempt, max_attempts, "[RELAY][FETCH] Download attempt");

            let result = match tokio::time::timeout(
                self.policy.timeout(),
                self.downloader.download(&item.media_locator, destination),
            )
            .await
            {
                Ok(Ok(_)) => inspect(destination).await,
                Ok(Err(e)) => Err(e),
                Err(_) => Err(FetchError::Timeout(self.policy.timeout())),
            };

            match result {
                Ok(file) => {
                    info!(
                        item_id = %item.id,
                        attempt,
                        bytes = file.size,
                        "[RELAY][FETCH] Download succeeded"
                    );
                    return Ok(file);
                }
                Err(e) => {
                    remove_partial(destination).await;
                    if attempt >= max_attempts {
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: Box::new(e),
                        });
                    }
                    warn!(
                        item_id = %item.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        backoff = ?self.policy.backoff(),
                        "[RELAY][FETCH] Download attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.backoff()).await;
                }
            }
        }
    }
}

async fn inspect(destination: &Path) -> Result<LocalMediaFile, FetchError> {
    match tokio::fs::metadata(destination).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(LocalMediaFile {
            path: destination.to_path_buf(),
            size: meta.len(),
        }),
        Ok(_) => Err(FetchError::EmptyMedia(destination.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FetchError::EmptyMedia(destination.to_path_buf()))
        }
        Err(e) => Err(FetchError::Io(e)),
    }
}

/// Every path a download into `destination` may leave behind: the file itself
/// plus the `.part` and `.ytdl` sidecars yt-dlp writes next to it.
pub fn partial_artifacts(destination: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = destination.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [
        destination.to_path_buf(),
        with_suffix(".part"),
        with_suffix(".ytdl"),
    ]
}

async fn remove_partial(destination: &Path) {
    for path in partial_artifacts(destination) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = ?e, path = %path.display(), "Failed to remove partial download"),
        }
    }
}

/// Plain HTTP(S) GET of a direct media URL.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download(&self, locator: &str, destination: &Path) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| FetchError::Transport(e.without_url().to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!(path = %destination.display(), bytes = written, "Streamed media to disk");
        Ok(written)
    }
}

/// How to invoke `yt-dlp`, shared by the downloader and the listing source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpOptions {
    pub program: String,
    pub format: String,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            format: "mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct YtDlpDownloader {
    options: YtDlpOptions,
}

impl YtDlpDownloader {
    pub fn new(options: YtDlpOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl MediaDownloader for YtDlpDownloader {
    async fn download(&self, locator: &str, destination: &Path) -> Result<u64, FetchError> {
        debug!(program = %self.options.program, locator, "Running yt-dlp download");

        // kill_on_drop: a timed-out attempt must not leave yt-dlp writing behind us
        let output = Command::new(&self.options.program)
            .arg("-f")
            .arg(&self.options.format)
            .arg("--no-part")
            .arg("--no-continue")
            .arg("-o")
            .arg(destination)
            .arg(locator)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(FetchError::Tool {
                program: self.options.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let size = tokio::fs::metadata(destination)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(size)
    }
}
