//! Chunked TCP transport.
//!
//! Each chunk travels as an independent request on its own connection:
//! file identifier, zero-based index, total chunk count, sender identity,
//! per-chunk SHA-256 and the payload. Chunks may arrive out of order and
//! from retried duplicate sends; the receiver stages one part file per
//! index and assembles the artifact when the last gap closes.
//!
//! # Wire format
//!
//! ```text
//! REQUEST (sender -> collector):
//!   [2 bytes BE: file_id len]  [file_id UTF-8]
//!   [2 bytes BE: sender len]   [sender UTF-8]
//!   [4 bytes BE: chunk index]
//!   [4 bytes BE: total chunks]
//!   [64 bytes: sha256 hex ASCII of the payload]
//!   [4 bytes BE: payload len]  [payload bytes]
//!
//! REPLY (collector -> sender):
//!   [4 bytes BE: body len]     [JSON body, e.g. {"status":"complete",...}]
//! ```

pub mod client;
pub mod server;
pub mod wire;

pub use client::{send_chunk, send_file};
pub use server::ChunkReceiver;
pub use wire::{ChunkFrame, ChunkReply};

use std::time::Duration;

/// Upper bound on a single chunk payload (64 MiB). Guards the receiver
/// against absurd length prefixes.
pub const MAX_CHUNK_PAYLOAD: usize = 64 * 1024 * 1024;

/// Upper bound on the JSON reply body.
pub const MAX_REPLY_LEN: usize = 16 * 1024;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver-side bound on reading one full chunk request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors produced by the chunk channel.
#[derive(Debug, thiserror::Error)]
pub enum ChunkChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("collector rejected chunk: {0}")]
    Rejected(String),

    #[error("connection timed out")]
    Timeout,

    #[error(transparent)]
    Transfer(#[from] logship_transfer::TransferError),

    #[error("catalog error: {0}")]
    Catalog(#[from] logship_catalog::CatalogError),
}
