//! One-pass shipping loop: scan, dedup, send with retries, retention.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};

use logship_ledger::Ledger;

use crate::SenderError;
use crate::probe::is_busy;
use crate::scanner::{Candidate, scan};
use crate::transport::Transport;

/// Settings for one shipping loop.
pub struct SenderConfig {
    /// Directory scanned for shippable files.
    pub root: PathBuf,
    /// File name suffix that marks a file as shippable.
    pub suffix: String,
    /// Attempts per file before it counts as failed for this pass.
    pub max_attempts: u32,
    /// Pause between attempts on the same file.
    pub retry_delay: Duration,
    /// Age after which an acknowledged file is deleted locally.
    pub retention: Duration,
}

impl SenderConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            suffix: ".log".into(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Per-pass tallies. One file lands in exactly one bucket, except that a
/// file counted `skipped` may additionally count `deleted` when the
/// retention pass removes it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub sent: usize,
    pub skipped: usize,
    pub busy: usize,
    pub failed: usize,
    pub deleted: usize,
}

/// Drives scan, dedup, transfer and retention over one transport.
pub struct Shipper<T: Transport> {
    pub config: SenderConfig,
    ledger: Ledger,
    transport: T,
}

impl<T: Transport> Shipper<T> {
    pub fn new(config: SenderConfig, ledger: Ledger, transport: T) -> Self {
        Self {
            config,
            ledger,
            transport,
        }
    }

    /// Runs one complete pass and reports what happened.
    ///
    /// Per-file transfer failures are tallied, never raised, so one bad
    /// file cannot stall the rest of the directory. Only ledger and
    /// filesystem faults on the sender's own state abort the pass.
    pub async fn run_once(&mut self) -> Result<RunReport, SenderError> {
        let candidates = scan(&self.config.root, &self.config.suffix)?;
        let mut report = RunReport::default();

        for candidate in &candidates {
            if self.ledger.is_sent(&candidate.relative_path) {
                report.skipped += 1;
                continue;
            }
            if is_busy(&candidate.path) {
                info!(path = %candidate.relative_path, "file busy, skipping this pass");
                report.busy += 1;
                continue;
            }
            if self.ship_one(candidate).await? {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        self.retention_pass(&candidates, &mut report);

        info!(
            sent = report.sent,
            skipped = report.skipped,
            busy = report.busy,
            failed = report.failed,
            deleted = report.deleted,
            "shipping pass finished"
        );
        Ok(report)
    }

    /// Sends one file with bounded retries. Returns `true` when the
    /// transfer was acknowledged and recorded.
    async fn ship_one(&mut self, candidate: &Candidate) -> Result<bool, SenderError> {
        for attempt in 1..=self.config.max_attempts {
            match self.transport.send(candidate).await {
                Ok(checksum) => {
                    // Recorded only after the collector's accept signal.
                    self.ledger.mark_sent(&candidate.relative_path, &checksum)?;
                    info!(path = %candidate.relative_path, attempt, "transfer acknowledged");
                    return Ok(true);
                }
                Err(e) => {
                    // Rejections retry too: a hash-mismatch reply can be
                    // transit corruption that a clean resend clears.
                    warn!(
                        path = %candidate.relative_path,
                        attempt,
                        max_attempts = self.config.max_attempts,
                        "transfer attempt failed: {e}"
                    );
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Deletes acknowledged files older than the retention window and
    /// drops their ledger entries. Best-effort per file.
    fn retention_pass(&mut self, candidates: &[Candidate], report: &mut RunReport) {
        for candidate in candidates {
            if !self.ledger.is_sent(&candidate.relative_path) {
                continue;
            }
            let age = match std::fs::metadata(&candidate.path)
                .and_then(|m| m.modified())
                .map(|mtime| mtime.elapsed().unwrap_or_default())
            {
                Ok(age) => age,
                Err(e) => {
                    warn!(path = %candidate.relative_path, "retention stat failed: {e}");
                    continue;
                }
            };
            if age < self.config.retention {
                continue;
            }
            if let Err(e) = std::fs::remove_file(&candidate.path) {
                warn!(path = %candidate.relative_path, "retention delete failed: {e}");
                continue;
            }
            // Dropping the entry keeps the ledger bounded to files that
            // still exist locally.
            if let Err(e) = self.ledger.remove(&candidate.relative_path) {
                warn!(path = %candidate.relative_path, "ledger cleanup failed: {e}");
                continue;
            }
            info!(path = %candidate.relative_path, "retention deleted acknowledged file");
            report.deleted += 1;
        }
    }

    /// Read access to the ledger, for inspection.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}
