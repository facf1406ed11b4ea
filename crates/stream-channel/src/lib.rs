//! Whole-file TCP transport.
//!
//! One connection carries one file: a fixed-width identity header,
//! then the raw bytes until the sender closes its write side. The
//! receiver verifies the whole-file checksum and replies with the
//! literal bytes `ACK` or `NAK: <reason>`.
//!
//! # Wire format
//!
//! ```text
//! HEADER (sender -> collector): [1024 bytes: "client_id|relative_path|sha256hex",
//!                                right-padded with ASCII spaces]
//! BODY   (sender -> collector): raw file bytes, EOF = sender closed write half
//! REPLY  (collector -> sender): b"ACK" | b"NAK: <reason>"
//! ```

pub mod client;
pub mod server;
pub mod wire;

pub use client::send_file;
pub use server::StreamReceiver;
pub use wire::{HEADER_LEN, IdentityHeader, Reply};

use std::time::Duration;

/// TCP read/write buffer size (64 KiB).
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Timeout for the TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver-side bound on each blocking read, so a stalled peer cannot
/// pin a worker forever.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors produced by the whole-file channel.
#[derive(Debug, thiserror::Error)]
pub enum StreamChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("collector rejected transfer: {0}")]
    Rejected(String),

    #[error("connection timed out")]
    Timeout,

    #[error(transparent)]
    Path(#[from] logship_transfer::TransferError),

    #[error("catalog error: {0}")]
    Catalog(#[from] logship_catalog::CatalogError),
}
