//! Binary chunk frames and the JSON reply body.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use logship_transfer::CHECKSUM_HEX_LEN;

use crate::{ChunkChannelError, MAX_CHUNK_PAYLOAD, MAX_REPLY_LEN};

/// One chunk request as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    /// Identifier shared by all chunks of one logical file.
    pub file_id: String,
    /// Sender identity.
    pub sender: String,
    /// Zero-based chunk index.
    pub index: u32,
    /// Total chunk count for this file identifier.
    pub total: u32,
    /// SHA-256 hex checksum of `payload`.
    pub checksum: String,
    /// Raw chunk bytes.
    pub payload: Vec<u8>,
}

/// The receiver's verdict on one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkReply {
    /// The chunk closed the last gap; the artifact is assembled and final.
    Complete { file_id: String },
    /// Chunk staged and verified; other indices are still missing. This
    /// is a checkpoint, not a failure.
    Incomplete { chunk_index: u32 },
    /// Chunk refused; no new receiver state was created by it.
    Rejected { reason: String },
}

/// Writes one chunk frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &ChunkFrame,
) -> Result<(), ChunkChannelError> {
    let file_id = frame.file_id.as_bytes();
    let sender = frame.sender.as_bytes();
    if file_id.len() > u16::MAX as usize || sender.len() > u16::MAX as usize {
        return Err(ChunkChannelError::Protocol("identifier too long".into()));
    }
    if frame.checksum.len() != CHECKSUM_HEX_LEN || !frame.checksum.is_ascii() {
        return Err(ChunkChannelError::Protocol(format!(
            "checksum must be {CHECKSUM_HEX_LEN} hex characters"
        )));
    }
    if frame.payload.len() > MAX_CHUNK_PAYLOAD {
        return Err(ChunkChannelError::Protocol(format!(
            "payload too large: {} bytes",
            frame.payload.len()
        )));
    }

    writer.write_u16(file_id.len() as u16).await?;
    writer.write_all(file_id).await?;
    writer.write_u16(sender.len() as u16).await?;
    writer.write_all(sender).await?;
    writer.write_u32(frame.index).await?;
    writer.write_u32(frame.total).await?;
    writer.write_all(frame.checksum.as_bytes()).await?;
    writer.write_u32(frame.payload.len() as u32).await?;
    writer.write_all(&frame.payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one chunk frame.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ChunkFrame, ChunkChannelError> {
    let file_id = read_short_string(reader, "file id").await?;
    let sender = read_short_string(reader, "sender").await?;
    let index = reader.read_u32().await?;
    let total = reader.read_u32().await?;

    let mut checksum_buf = [0u8; CHECKSUM_HEX_LEN];
    reader.read_exact(&mut checksum_buf).await?;
    let checksum = std::str::from_utf8(&checksum_buf)
        .map_err(|e| ChunkChannelError::Protocol(format!("checksum is not ASCII: {e}")))?
        .to_string();

    let payload_len = reader.read_u32().await? as usize;
    if payload_len > MAX_CHUNK_PAYLOAD {
        return Err(ChunkChannelError::Protocol(format!(
            "declared payload too large: {payload_len} bytes"
        )));
    }
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    Ok(ChunkFrame {
        file_id,
        sender,
        index,
        total,
        checksum,
        payload,
    })
}

/// Writes the length-prefixed JSON reply and flushes.
pub async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &ChunkReply,
) -> Result<(), ChunkChannelError> {
    let body = serde_json::to_vec(reply)
        .map_err(|e| ChunkChannelError::Protocol(format!("reply encoding failed: {e}")))?;
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the length-prefixed JSON reply.
pub async fn read_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ChunkReply, ChunkChannelError> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_REPLY_LEN {
        return Err(ChunkChannelError::Protocol(format!(
            "reply too large: {len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map_err(|e| ChunkChannelError::Protocol(format!("malformed reply: {e}")))
}

async fn read_short_string<R: AsyncRead + Unpin>(
    reader: &mut R,
    what: &str,
) -> Result<String, ChunkChannelError> {
    let len = reader.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    String::from_utf8(buf)
        .map_err(|e| ChunkChannelError::Protocol(format!("{what} is not UTF-8: {e}")))
}
