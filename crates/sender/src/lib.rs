//! Edge-side shipping loop.
//!
//! One pass over a watched directory: scan for log files, skip what the
//! ledger already recorded as acknowledged, skip files something is still
//! writing to, send the rest with bounded retries, then delete old files
//! whose transfer was acknowledged long enough ago.

pub mod probe;
pub mod scanner;
pub mod shipper;
pub mod transport;

pub use scanner::{Candidate, scan};
pub use shipper::{RunReport, SenderConfig, Shipper};
pub use transport::{ChunkTransport, StreamTransport, Transport, TransportError, default_client_id};

/// Errors produced by the shipping loop itself. Per-file transfer
/// failures are counted in [`RunReport`], not raised.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger error: {0}")]
    Ledger(#[from] logship_ledger::LedgerError),
}
