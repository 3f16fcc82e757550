//! High-level pipeline: orchestrates list → select → fetch → publish → commit.
//!
//! [`relay`] drives one batch for a single source:
//!   - Lists candidates from the [`SourceAdapter`] (a failure here aborts the run)
//!   - Filters them against the [`Ledger`] and orders them oldest first
//!   - For each item: downloads into a scoped work file, publishes it, then
//!     records and persists the item id before moving on
//!   - Returns a [`RelayReport`] with one outcome per selected item
//!
//! # Guarantees
//! - An id is recorded only after the [`Publisher`] confirmed success, and the
//!   ledger is flushed immediately, before the next item starts.
//! - A failing item never stops the rest of the batch.
//! - The work file for an item is removed on every exit path, including panics
//!   and early returns, through [`ScopedMediaPath`].
//!
//! # Known gap
//! Publish and commit are two separate steps. If the process dies after the
//! destination accepted a video but before the ledger is flushed, the next run
//! will publish that item again. Relaying is at-most-once per commit, not
//! exactly-once.

use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::contract::{CandidateItem, MediaDownloader, Publisher, SourceAdapter};
use crate::download::{partial_artifacts, Fetcher};
use crate::error::{ItemError, RelayError};
use crate::ledger::Ledger;
use crate::select::select;

#[derive(Debug)]
pub enum RelayOutcome {
    Success { remote_id: String },
    Skipped { reason: SkipReason },
    Failed { error: ItemError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRelayed,
}

#[derive(Debug)]
pub struct ItemReport {
    pub item_id: String,
    pub outcome: RelayOutcome,
}

/// Per-run result, in processing order. Never persisted.
#[derive(Debug, Default)]
pub struct RelayReport {
    pub items: Vec<ItemReport>,
}

impl RelayReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, RelayOutcome::Success { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RelayOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RelayOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&RelayOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }
}

/// Removes the item's work file when dropped.
pub struct ScopedMediaPath {
    path: PathBuf,
}

impl ScopedMediaPath {
    pub fn new(work_dir: &Path, item_id: &str) -> Self {
        Self {
            path: work_dir.join(format!("{}.mp4", file_stem(item_id))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedMediaPath {
    fn drop(&mut self) {
        for path in partial_artifacts(&self.path) {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "[RELAY] Removed work file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = ?e, path = %path.display(), "[RELAY] Failed to remove work file"),
            }
        }
    }
}

/// Item ids come from remote platforms; keep only filesystem-safe characters.
fn file_stem(item_id: &str) -> String {
    let stem: String = item_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "item".to_string()
    } else {
        stem
    }
}

pub async fn relay<S, D, P>(
    config: &RelayConfig,
    source: &S,
    fetcher: &Fetcher<D>,
    publisher: &P,
    ledger: &mut Ledger,
) -> Result<RelayReport, RelayError>
where
    S: SourceAdapter + ?Sized,
    D: MediaDownloader,
    P: Publisher + ?Sized,
{
    let span = info_span!("relay", run_id = %Uuid::new_v4());
    async move {
        info!(batch_limit = config.batch_limit, "[RELAY] Starting relay run");

        let candidates = match source.list_candidates(config.batch_limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "[RELAY][ERROR] Source unavailable, aborting run");
                return Err(RelayError::SourceUnavailable(e));
            }
        };

        let queue = select(candidates, ledger);
        if queue.is_empty() {
            info!("[RELAY] No new items to relay");
            return Ok(RelayReport::default());
        }

        if let Err(e) = tokio::fs::create_dir_all(&config.work_dir).await {
            error!(error = ?e, path = %config.work_dir.display(), "[RELAY][ERROR] Cannot create work directory");
            return Err(RelayError::Workspace {
                path: config.work_dir.clone(),
                source: e,
            });
        }

        info!(items = queue.len(), "[RELAY] Relaying unseen items oldest first");
        let mut report = RelayReport::default();
        for item in queue {
            let item_span = info_span!("item", item_id = %item.id);
            let outcome = relay_item(config, &item, fetcher, publisher, ledger)
                .instrument(item_span)
                .await;
            report.items.push(ItemReport {
                item_id: item.id,
                outcome,
            });
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "[RELAY] Relay run complete"
        );
        Ok(report)
    }
    .instrument(span)
    .await
}

async fn relay_item<D, P>(
    config: &RelayConfig,
    item: &CandidateItem,
    fetcher: &Fetcher<D>,
    publisher: &P,
    ledger: &mut Ledger,
) -> RelayOutcome
where
    D: MediaDownloader,
    P: Publisher + ?Sized,
{
    if ledger.contains(&item.id) {
        info!("[RELAY] Already relayed, skipping");
        return RelayOutcome::Skipped {
            reason: SkipReason::AlreadyRelayed,
        };
    }

    let work_file = ScopedMediaPath::new(&config.work_dir, &item.id);

    let file = match fetcher.fetch(item, work_file.path()).await {
        Ok(file) => file,
        Err(e) => {
            error!(error = %e, "[RELAY][FETCH][ERROR] Download failed");
            return RelayOutcome::Failed {
                error: ItemError::Fetch(e),
            };
        }
    };

    info!(bytes = file.size, "[RELAY][PUBLISH] Uploading to destination");
    let remote = match publisher.publish(&file, &item.caption).await {
        Ok(remote) => remote,
        Err(e) => {
            error!(error = %e, "[RELAY][PUBLISH][ERROR] Upload failed");
            return RelayOutcome::Failed {
                error: ItemError::Publish(e),
            };
        }
    };
    info!(remote_id = %remote.id, "[RELAY][PUBLISH] Upload succeeded");

    ledger.record(&item.id);
    if let Err(e) = ledger.persist() {
        error!(
            remote_id = %remote.id,
            error = %e,
            "[RELAY][COMMIT][ERROR] Published but ledger flush failed; a later run may post this item again"
        );
        return RelayOutcome::Failed {
            error: ItemError::Commit {
                remote_id: remote.id,
                source: e,
            },
        };
    }
    info!(remote_id = %remote.id, "[RELAY][COMMIT] Recorded as relayed");

    RelayOutcome::Success {
        remote_id: remote.id,
    }
}
