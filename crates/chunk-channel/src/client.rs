//! Chunk sender side: one connection per chunk.

use std::net::SocketAddr;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tracing::{debug, info};

use logship_transfer::{ChunkReader, validate_file_id};

use crate::wire::{ChunkFrame, ChunkReply, read_reply, write_frame};
use crate::{CONNECT_TIMEOUT, ChunkChannelError};

/// Sends one chunk as an independent request and returns the verdict.
///
/// Re-sending an already-staged index is safe; the receiver overwrites
/// the part idempotently.
pub async fn send_chunk(
    addr: SocketAddr,
    frame: &ChunkFrame,
) -> Result<ChunkReply, ChunkChannelError> {
    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(ChunkChannelError::Timeout),
    };

    let (mut reader, mut writer) = stream.into_split();
    write_frame(&mut writer, frame).await?;

    let reply = read_reply(&mut reader).await?;
    debug!(
        file_id = %frame.file_id,
        index = frame.index,
        total = frame.total,
        ?reply,
        "chunk sent"
    );
    Ok(reply)
}

/// Chunks a file and sends every chunk in index order.
///
/// The receiver must report `complete` on the final chunk unless another
/// sender already contributed parts; a rejection of any chunk aborts the
/// whole unit so the caller's retry policy treats it as one failure.
///
/// Returns the whole-file SHA-256 hex checksum folded from the chunks as
/// they were read, so it hashes exactly the bytes that went on the wire
/// even if the file changes afterwards.
pub async fn send_file(
    addr: SocketAddr,
    file_id: &str,
    sender: &str,
    local_path: &Path,
    chunk_size: usize,
) -> Result<String, ChunkChannelError> {
    validate_file_id(file_id)?;

    let mut reader = ChunkReader::new(local_path, chunk_size)?;
    let mut hasher = Sha256::new();
    let mut last_reply = None;

    while let Some(chunk) = reader.next_chunk()? {
        hasher.update(&chunk.data);
        let frame = ChunkFrame {
            file_id: file_id.to_string(),
            sender: sender.to_string(),
            index: chunk.index,
            total: chunk.total,
            checksum: chunk.checksum,
            payload: chunk.data,
        };

        match send_chunk(addr, &frame).await? {
            ChunkReply::Rejected { reason } => {
                return Err(ChunkChannelError::Rejected(reason));
            }
            reply => last_reply = Some(reply),
        }
    }

    match last_reply {
        Some(ChunkReply::Complete { .. }) => {
            info!(%file_id, "chunk channel: file complete");
            Ok(hex::encode(hasher.finalize()))
        }
        Some(ChunkReply::Incomplete { chunk_index }) => Err(ChunkChannelError::Protocol(format!(
            "file still incomplete after final chunk (last accepted index {chunk_index})"
        ))),
        _ => Err(ChunkChannelError::Protocol(
            "no chunks were produced for file".into(),
        )),
    }
}
