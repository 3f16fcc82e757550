//! Error taxonomy for the relay pipeline.
//!
//! Run-level failures ([`RelayError`]) abort a batch before any item is touched.
//! Everything that can go wrong for a single item is folded into [`ItemError`]
//! and reported as part of the batch result instead of crossing the
//! orchestrator boundary.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A source adapter could not produce its candidate list.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("transport error talking to source: {0}")]
    Transport(String),

    #[error("source returned HTTP {status}")]
    Status { status: u16 },

    #[error("source API refused the request: {0}")]
    Api(String),

    #[error("source response could not be decoded: {0}")]
    Decode(String),
}

/// One failed download attempt, or the final verdict after retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("{program} exited with {status}: {stderr}")]
    Tool {
        program: String,
        status: String,
        stderr: String,
    },

    /// The locator is a handle that could not be turned into a download URL.
    #[error("media locator could not be resolved: {0}")]
    Resolve(String),

    #[error("download attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("download produced no media at {0}")]
    EmptyMedia(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

/// The destination refused or failed the upload. Never retried.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("destination returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("destination rejected the upload (code {code:?}): {message}")]
    Rejected { code: Option<i64>, message: String },

    #[error("unrecognised destination response: {0}")]
    MalformedResponse(String),

    #[error("I/O error reading media: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("ledger could not be moved into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Why a single item did not reach the committed state.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    /// Published remotely, but the ledger could not be flushed.
    #[error("published as {remote_id} but commit failed: {source}")]
    Commit {
        remote_id: String,
        #[source]
        source: LedgerError,
    },
}

/// Fatal to the whole run; no items are processed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("work directory {path} unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
