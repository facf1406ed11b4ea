//! Transfer backends for the shipping loop.
//!
//! The loop is generic over [`Transport`] so the same scan/dedup/retry
//! machinery drives either channel, and tests can substitute a mock.

use std::net::SocketAddr;

use crate::scanner::Candidate;

/// Errors from a single transfer attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Stream(#[from] logship_stream_channel::StreamChannelError),

    #[error(transparent)]
    Chunk(#[from] logship_chunk_channel::ChunkChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One way of moving a file to the collector.
///
/// Returns the whole-file SHA-256 hex checksum of what was sent, which
/// the caller records in the ledger.
pub trait Transport {
    async fn send(&self, candidate: &Candidate) -> Result<String, TransportError>;
}

/// The sender identity used when none is configured explicitly.
pub fn default_client_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string())
}

/// Whole-file transfers over the stream channel.
pub struct StreamTransport {
    pub addr: SocketAddr,
    pub client_id: String,
}

impl StreamTransport {
    /// Transport identified by the local hostname.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            client_id: default_client_id(),
        }
    }
}

impl Transport for StreamTransport {
    async fn send(&self, candidate: &Candidate) -> Result<String, TransportError> {
        let checksum = logship_stream_channel::send_file(
            self.addr,
            &self.client_id,
            &candidate.relative_path,
            &candidate.path,
        )
        .await?;
        Ok(checksum)
    }
}

/// Chunked transfers over the chunk channel.
///
/// Each send mints a fresh `<timestamp>_<file name>` identifier, so a
/// re-shipped file lands as a new artifact instead of colliding with a
/// completed one.
pub struct ChunkTransport {
    pub addr: SocketAddr,
    pub sender_id: String,
    pub chunk_size: usize,
}

impl ChunkTransport {
    /// Transport identified by the local hostname, using the default
    /// chunk size.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            sender_id: default_client_id(),
            chunk_size: logship_transfer::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Transport for ChunkTransport {
    async fn send(&self, candidate: &Candidate) -> Result<String, TransportError> {
        let file_id = format!(
            "{}_{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            candidate.file_name()
        );
        // The returned checksum is folded from the chunks as they were
        // read, so the ledger records the bytes actually shipped even if
        // the file grows afterwards.
        let checksum = logship_chunk_channel::send_file(
            self.addr,
            &file_id,
            &self.sender_id,
            &candidate.path,
            self.chunk_size,
        )
        .await?;
        Ok(checksum)
    }
}
