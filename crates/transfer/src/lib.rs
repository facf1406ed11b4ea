//! Chunking, checksums and path validation shared by both transports.
//!
//! The payload is an opaque byte blob identified by a path and a
//! checksum; nothing here interprets log contents.

mod checksum;
mod chunker;
mod validation;

pub use checksum::{checksum_bytes, file_checksum};
pub use chunker::{ChunkReader, FileChunk};
pub use validation::{validate_file_id, validate_relative_path};

/// Default chunk size: 512 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Length of a SHA-256 checksum in lowercase hex characters.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
