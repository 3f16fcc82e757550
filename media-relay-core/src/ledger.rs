//! Durable record of item ids that have already been relayed.
//!
//! Stored as a single JSON object, `{ "posted_ids": [...] }`. A missing or
//! unreadable file is treated as an empty ledger. The set only grows: there is
//! no deletion and no expiry.
//!
//! [`Ledger::persist`] writes to a temporary file in the same directory and
//! renames it over the target, so a concurrent reader sees either the old or
//! the new content, never a partial write.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::LedgerError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    posted_ids: Vec<String>,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    // insertion order, as written to disk
    posted_ids: Vec<String>,
    index: HashSet<String>,
}

impl Ledger {
    /// An empty ledger that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            posted_ids: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Load the ledger at `path`. Never fails: absent or corrupt storage
    /// yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No ledger file yet, starting empty");
                return Self::empty(path);
            }
            Err(e) => {
                warn!(error = ?e, path = %path.display(), "Ledger unreadable, starting empty");
                return Self::empty(path);
            }
        };

        let file: LedgerFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Ledger corrupt, starting empty");
                return Self::empty(path);
            }
        };

        let mut ledger = Self::empty(path);
        for id in file.posted_ids {
            ledger.record(&id);
        }
        info!(
            path = %ledger.path.display(),
            posted = ledger.len(),
            "Loaded ledger"
        );
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Add `id` to the in-memory set. Returns `false` if it was already there.
    pub fn record(&mut self, id: &str) -> bool {
        if !self.index.insert(id.to_string()) {
            return false;
        }
        self.posted_ids.push(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.posted_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posted_ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.posted_ids.iter().map(String::as_str)
    }

    /// Flush the full set to disk via write-to-temp-then-rename.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let body = LedgerFile {
            posted_ids: self.posted_ids.clone(),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &body)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(path = %self.path.display(), posted = self.len(), "Persisted ledger");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let ledger = Ledger::load(dir.path().join("posted_cache.json"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        fs::write(&path, "{ this is not json").unwrap();

        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
        assert_eq!(ledger.path(), path.as_path());
    }

    #[test]
    fn object_without_posted_ids_loads_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        fs::write(&path, "{}").unwrap();
        assert!(Ledger::load(&path).is_empty());
    }

    #[test]
    fn record_is_idempotent() {
        let mut ledger = Ledger::empty("unused.json");
        assert!(ledger.record("a"));
        assert!(!ledger.record("a"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("a"));
        assert!(!ledger.contains("b"));
    }

    #[test]
    fn persist_then_load_keeps_ids_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("posted_cache.json");

        let mut ledger = Ledger::empty(&path);
        ledger.record("c3");
        ledger.record("c4");
        ledger.persist().unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["posted_ids"], serde_json::json!(["c3", "c4"]));

        let reloaded = Ledger::load(&path);
        assert_eq!(reloaded.ids().collect::<Vec<_>>(), vec!["c3", "c4"]);
    }

    #[test]
    fn persist_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        let mut ledger = Ledger::empty(&path);
        ledger.record("x");
        ledger.persist().unwrap();
        ledger.record("y");
        ledger.persist().unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "only the ledger file should remain");
    }

    #[test]
    fn duplicate_ids_on_disk_collapse_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("posted_cache.json");
        fs::write(&path, r#"{"posted_ids":["a","b","a"]}"#).unwrap();

        let ledger = Ledger::load(&path);
        assert_eq!(ledger.len(), 2);
    }
}
