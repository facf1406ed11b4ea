//! Collector-side catalog of completed transfers.
//!
//! One JSON line is appended per accepted artifact; the dashboard and
//! download endpoints read this file but never write it. The channels
//! only append after their duplicate check passed, so each artifact
//! appears exactly once.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors produced by the catalog store.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog line is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// One completed-transfer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Artifact name: the final path of the assembled file, relative to
    /// the collector's upload directory. Unique per transfer.
    pub artifact: String,
    /// The file's name as the sender knew it.
    pub original_name: String,
    /// Sender identity.
    pub sender: String,
    /// RFC 3339 completion timestamp.
    pub timestamp: String,
}

impl CatalogRecord {
    /// Builds a record stamped with the current time.
    pub fn now(artifact: &str, original_name: &str, sender: &str) -> Self {
        Self {
            artifact: artifact.to_string(),
            original_name: original_name.to_string(),
            sender: sender.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Append-only JSON Lines catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    path: PathBuf,
}

impl Catalog {
    /// Creates a handle to the catalog file at `path`. The file is
    /// created on first append.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Appends one record as a single JSON line.
    pub fn append(&self, record: &CatalogRecord) -> Result<(), CatalogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Loads all records. A missing file is an empty catalog.
    pub fn load(&self) -> Result<Vec<CatalogRecord>, CatalogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let mut records = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(line)?);
        }
        Ok(records)
    }
}
