//! Whole-file sender side: one connection, one file.

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info};

use logship_transfer::{file_checksum, validate_file_id, validate_relative_path};

use crate::wire::{IdentityHeader, Reply, read_reply};
use crate::{CONNECT_TIMEOUT, STREAM_BUFFER_SIZE, StreamChannelError};

/// Sends one file as a whole-file unit and waits for the verdict.
///
/// The checksum is computed locally from the file's bytes before the
/// connection is opened. Returns that checksum on `ACK`; any `NAK`
/// surfaces as [`StreamChannelError::Rejected`].
pub async fn send_file(
    addr: SocketAddr,
    client_id: &str,
    relative_path: &str,
    local_path: &Path,
) -> Result<String, StreamChannelError> {
    validate_file_id(client_id)?;
    validate_relative_path(relative_path)?;

    let checksum = file_checksum(local_path)?;
    let header = IdentityHeader {
        client_id: client_id.to_string(),
        relative_path: relative_path.to_string(),
        checksum: checksum.clone(),
    };
    let encoded = header.encode()?;

    let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(StreamChannelError::Timeout),
    };
    debug!(%addr, path = %relative_path, "stream channel connected");

    let (mut reader, writer) = stream.into_split();
    let mut writer = BufWriter::with_capacity(STREAM_BUFFER_SIZE, writer);

    writer.write_all(&encoded).await?;

    let mut file = tokio::fs::File::open(local_path).await?;
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
    }

    // Closing the write half signals end-of-body to the receiver.
    writer.shutdown().await?;

    match read_reply(&mut reader).await? {
        Reply::Ack => {
            info!(path = %relative_path, "stream channel: transfer acknowledged");
            Ok(checksum)
        }
        Reply::Nak(reason) => Err(StreamChannelError::Rejected(reason)),
    }
}
