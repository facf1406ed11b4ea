//! Whole-file receiver: one transfer unit per connection.
//!
//! Per-connection state machine:
//! `AWAITING_HEADER -> RECEIVING_BODY -> VERIFYING -> ACCEPTED | REJECTED`.
//! Workers handling different files never contend; concurrent sends of
//! the same file serialize on the target path, where the existence check
//! is authoritative (the filesystem is the lock).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_catalog::{Catalog, CatalogRecord};
use logship_transfer::{validate_file_id, validate_relative_path};

use crate::wire::{HEADER_LEN, IdentityHeader, Reply, write_reply};
use crate::{READ_TIMEOUT, STREAM_BUFFER_SIZE, StreamChannelError};

/// Whole-file receiver. Artifacts land under
/// `<base_dir>/<client_id>/<relative_path>`.
pub struct StreamReceiver {
    base_dir: PathBuf,
    catalog: Catalog,
    cancel: CancellationToken,
}

impl StreamReceiver {
    pub fn new(base_dir: PathBuf, catalog: Catalog, cancel: CancellationToken) -> Self {
        Self {
            base_dir,
            catalog,
            cancel,
        }
    }

    /// Binds the listening socket.
    pub async fn listen(&self, addr: SocketAddr) -> Result<TcpListener, StreamChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "stream receiver listening");
        Ok(listener)
    }

    /// Accepts connections until cancelled, one task per connection.
    pub async fn serve(self, listener: TcpListener) -> Result<(), StreamChannelError> {
        let receiver = Arc::new(self);
        loop {
            tokio::select! {
                _ = receiver.cancel.cancelled() => {
                    info!("stream receiver shutting down");
                    break Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let receiver = Arc::clone(&receiver);
                            tokio::spawn(async move {
                                receiver.handle_connection(stream, peer_addr).await;
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
            }
        }
    }

    /// Runs the full state machine for one connection and always sends
    /// a reply, even on internal errors.
    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let (reader, mut writer) = stream.into_split();

        let reply = match self.receive_one(reader).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%peer_addr, "error while receiving: {e}");
                Reply::Nak("server error".into())
            }
        };

        if let Reply::Nak(reason) = &reply {
            warn!(%peer_addr, reason = %reason, "transfer rejected");
        }
        // Best-effort: the peer may already be gone.
        if let Err(e) = write_reply(&mut writer, &reply).await {
            debug!(%peer_addr, "failed to send reply: {e}");
        }
    }

    /// Receives and verifies one whole-file unit.
    ///
    /// Returns `Ok(Nak(..))` for contract-level rejections (malformed
    /// header, duplicate, hash mismatch) and `Err` for internal faults.
    async fn receive_one(
        &self,
        reader: tokio::net::tcp::OwnedReadHalf,
    ) -> Result<Reply, StreamChannelError> {
        let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, reader);

        // AWAITING_HEADER: exact-length read, never delimiter-based.
        let mut header_buf = [0u8; HEADER_LEN];
        match tokio::time::timeout(READ_TIMEOUT, reader.read_exact(&mut header_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(StreamChannelError::Timeout),
        }

        let header = match IdentityHeader::parse(&header_buf) {
            Ok(h) => h,
            Err(e) => {
                drain(&mut reader).await;
                return Ok(Reply::Nak(e.to_string()));
            }
        };
        if let Err(e) = validate_file_id(&header.client_id) {
            drain(&mut reader).await;
            return Ok(Reply::Nak(e.to_string()));
        }
        if let Err(e) = validate_relative_path(&header.relative_path) {
            drain(&mut reader).await;
            return Ok(Reply::Nak(e.to_string()));
        }

        let target = self
            .base_dir
            .join(&header.client_id)
            .join(&header.relative_path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Duplicate guard: the target is claimed with an atomic
        // create-new open, so racing sends of the same path pick exactly
        // one writer and the loser never touches the winner's bytes.
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                drain(&mut reader).await;
                return Ok(Reply::Nak("file already exists".into()));
            }
            Err(e) => return Err(e.into()),
        };

        // RECEIVING_BODY: stream to the target while hashing the bytes
        // actually written.
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
        let mut received: u64 = 0;

        loop {
            let n = match tokio::time::timeout(READ_TIMEOUT, reader.read(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    self.discard(&target).await;
                    return Err(e.into());
                }
                Err(_) => {
                    self.discard(&target).await;
                    return Err(StreamChannelError::Timeout);
                }
            };
            if n == 0 {
                break; // sender closed its write half
            }
            if let Err(e) = tokio::io::AsyncWriteExt::write_all(&mut file, &buf[..n]).await {
                self.discard(&target).await;
                return Err(e.into());
            }
            hasher.update(&buf[..n]);
            received += n as u64;
        }
        tokio::io::AsyncWriteExt::flush(&mut file).await?;
        drop(file);

        // VERIFYING.
        let actual = hex::encode(hasher.finalize());
        if actual != header.checksum {
            self.discard(&target).await;
            return Ok(Reply::Nak("hash mismatch".into()));
        }

        // ACCEPTED: the catalog row is the only catalog mutation, once
        // per completed transfer.
        let artifact = format!("{}/{}", header.client_id, header.relative_path);
        let record = CatalogRecord::now(&artifact, &header.relative_path, &header.client_id);
        if let Err(e) = self.catalog.append(&record) {
            self.discard(&target).await;
            return Err(e.into());
        }

        info!(
            sender = %header.client_id,
            path = %header.relative_path,
            bytes = received,
            "transfer verified and persisted"
        );
        Ok(Reply::Ack)
    }

    /// Removes a partially written or unverifiable target. Best-effort.
    async fn discard(&self, target: &std::path::Path) {
        if let Err(e) = tokio::fs::remove_file(target).await {
            warn!(target = %target.display(), "failed to discard partial artifact: {e}");
        }
    }
}

/// Reads the rest of the body to EOF before a rejection reply, so the
/// reply is not lost to a connection reset while the sender is still
/// writing. Best-effort and bounded per read.
async fn drain<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    loop {
        match tokio::time::timeout(READ_TIMEOUT, reader.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serve_stops_on_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let receiver = StreamReceiver::new(
            dir.path().join("received"),
            Catalog::new(&dir.path().join("catalog.jsonl")),
            cancel.clone(),
        );
        let listener = receiver
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let handle = tokio::spawn(async move { receiver.serve(listener).await });
        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn concurrent_transfers_of_distinct_files() {
        use crate::client::send_file;

        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("received");
        let catalog = Catalog::new(&dir.path().join("catalog.jsonl"));
        let cancel = CancellationToken::new();

        let receiver = StreamReceiver::new(base_dir.clone(), catalog.clone(), cancel.clone());
        let listener = receiver
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { receiver.serve(listener).await });

        let src = tempfile::tempdir().unwrap();
        let mut handles = Vec::new();
        for i in 0..4 {
            let local = src.path().join(format!("f{i}.log"));
            std::fs::write(&local, format!("payload {i}")).unwrap();
            handles.push(tokio::spawn(async move {
                send_file(addr, "edge-1", &format!("f{i}.log"), &local).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(catalog.load().unwrap().len(), 4);
        for i in 0..4 {
            let artifact = base_dir.join(format!("edge-1/f{i}.log"));
            assert_eq!(
                std::fs::read(&artifact).unwrap(),
                format!("payload {i}").as_bytes()
            );
        }

        cancel.cancel();
    }

    #[tokio::test]
    async fn racing_sends_of_one_path_accept_exactly_one() {
        use crate::client::send_file;

        let dir = tempfile::tempdir().unwrap();
        let base_dir = dir.path().join("received");
        let catalog = Catalog::new(&dir.path().join("catalog.jsonl"));
        let cancel = CancellationToken::new();

        let receiver = StreamReceiver::new(base_dir.clone(), catalog.clone(), cancel.clone());
        let listener = receiver
            .listen("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { receiver.serve(listener).await });

        // Four senders race the same logical path with different bodies.
        let src = tempfile::tempdir().unwrap();
        let mut handles = Vec::new();
        for i in 0..4 {
            let local = src.path().join(format!("v{i}.log"));
            std::fs::write(&local, format!("version {i}")).unwrap();
            handles.push(tokio::spawn(async move {
                send_file(addr, "edge-1", "contended.log", &local).await
            }));
        }

        let mut accepted = Vec::new();
        for h in handles {
            match h.await.unwrap() {
                Ok(checksum) => accepted.push(checksum),
                Err(StreamChannelError::Rejected(reason)) => {
                    assert!(reason.contains("already exists"), "reason: {reason}");
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted.len(), 1);

        // The artifact holds exactly the acknowledged body, and the
        // catalog saw exactly one append.
        let artifact = base_dir.join("edge-1/contended.log");
        assert_eq!(
            logship_transfer::file_checksum(&artifact).unwrap(),
            accepted[0]
        );
        assert_eq!(catalog.load().unwrap().len(), 1);

        cancel.cancel();
    }
}
