//! # contract: capability interfaces consumed by the relay pipeline
//!
//! The orchestrator only ever talks to three narrow seams:
//!
//! - [`SourceAdapter`] lists candidate posts from one platform, newest first.
//! - [`MediaDownloader`] performs a single download attempt of one media locator.
//! - [`Publisher`] uploads one local media file to the destination page.
//!
//! New platforms are added by implementing one of these traits, never by
//! branching inside the orchestrator. Concrete implementations live in
//! [`crate::source`], [`crate::download`] and the CLI crate's Graph client.
//!
//! ## Mocking & Testing
//! The traits are annotated for `mockall`; with the default `test-export-mocks`
//! feature the generated `Mock*` types are exported for integration tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, PublishError, SourceError};

/// A video post discovered at the source. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Unique within the source.
    pub id: String,
    /// Direct URL or an opaque handle understood by the matching downloader.
    pub media_locator: String,
    pub caption: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl CandidateItem {
    pub fn new(
        id: impl Into<String>,
        media_locator: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            media_locator: media_locator.into(),
            caption: caption.into(),
            published_at: None,
        }
    }
}

/// A downloaded media file on local disk.
///
/// The path is owned by the orchestrator's scoped guard; this value only
/// describes what is there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMediaFile {
    pub path: PathBuf,
    pub size: u64,
}

/// The destination's identifier for a successfully published video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVideo {
    pub id: String,
}

/// Lists candidate items from one platform.
///
/// Implementations must not consult the ledger, and must fail loudly (rather
/// than return partial data) when they cannot authenticate or connect.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Up to `limit` candidates, ordered newest first.
    async fn list_candidates(&self, limit: usize) -> Result<Vec<CandidateItem>, SourceError>;
}

/// One download attempt of a media locator into `destination`.
///
/// Retry, timeout and partial-file cleanup are handled by
/// [`crate::download::Fetcher`]; implementors only stream bytes to disk.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Returns the number of bytes written, when the implementation knows it.
    async fn download(&self, locator: &str, destination: &Path) -> Result<u64, FetchError>;
}

/// Uploads a local media file plus caption to the destination.
///
/// Exactly one remote call per invocation; never retried at this layer.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        file: &LocalMediaFile,
        caption: &str,
    ) -> Result<RemoteVideo, PublishError>;
}
