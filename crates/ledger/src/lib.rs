//! Persistent dedup ledger for the sender.
//!
//! Maps a file's logical relative path to the checksum and timestamp of
//! its last verified transfer. Consulted before every send and updated
//! only after the collector acknowledged a complete, verified transfer,
//! never speculatively. A crash mid-transfer leaves the file eligible
//! for retry instead of falsely marked done.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors produced by the ledger store.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One verified-sent record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// RFC 3339 timestamp of the acknowledged transfer.
    pub timestamp: String,
    /// SHA-256 hex checksum of the file at the time of transfer.
    pub checksum: String,
}

/// JSON-file-backed ledger keyed by relative path.
///
/// The whole map is rewritten on every mutation via a temp file and
/// rename, so a crash never leaves a half-written ledger behind. A
/// concurrent write to the same key is idempotent (last write wins).
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    /// Opens the ledger at `path`, loading existing entries if the file
    /// exists. A missing file starts an empty ledger.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let entries = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Returns `true` if `relative_path` has an acknowledged transfer.
    pub fn is_sent(&self, relative_path: &str) -> bool {
        self.entries.contains_key(relative_path)
    }

    /// Returns the entry for `relative_path`, if any.
    pub fn get(&self, relative_path: &str) -> Option<&LedgerEntry> {
        self.entries.get(relative_path)
    }

    /// Records an acknowledged transfer and persists the ledger.
    ///
    /// Call this only after the collector replied with an explicit
    /// accept signal.
    pub fn mark_sent(&mut self, relative_path: &str, checksum: &str) -> Result<(), LedgerError> {
        let entry = LedgerEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            checksum: checksum.to_string(),
        };
        self.entries.insert(relative_path.to_string(), entry);
        self.persist()
    }

    /// Removes an entry (used by the retention pass to keep the ledger
    /// bounded) and persists the ledger.
    pub fn remove(&mut self, relative_path: &str) -> Result<(), LedgerError> {
        if self.entries.remove(relative_path).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// All recorded relative paths, for iteration by the retention pass.
    pub fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the ledger has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), LedgerError> {
        let data = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
