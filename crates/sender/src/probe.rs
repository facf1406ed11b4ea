//! Busy-file heuristic.

use std::path::Path;

use tracing::debug;

/// Returns `true` if `path` looks like something is still writing to it.
///
/// The probe opens the file for appending and treats a failure to do so
/// as "busy". This catches exclusive locks and permission races, not a
/// cooperative writer that keeps the file open without locking it; the
/// check is inherently racy and callers must treat a `false` here as a
/// hint, not a guarantee. A busy file is simply skipped this pass and
/// picked up on the next one.
pub fn is_busy(path: &Path) -> bool {
    match std::fs::OpenOptions::new().append(true).open(path) {
        Ok(_) => false,
        Err(e) => {
            debug!(path = %path.display(), "append probe failed: {e}");
            true
        }
    }
}
