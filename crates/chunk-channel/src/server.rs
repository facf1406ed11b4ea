//! Chunk receiver: staging, verification and reassembly.
//!
//! Per-request state machine:
//! `AWAITING_HEADER -> RECEIVING_BODY -> VERIFYING -> ACCEPTED | REJECTED`.
//! All cross-request state lives on disk: one staging directory per file
//! identifier with one `<index>.part` per received chunk. Existence
//! checks on the final artifact are authoritative, so duplicate and
//! racing deliveries stay benign without in-memory locks.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use logship_catalog::{Catalog, CatalogRecord};
use logship_transfer::{checksum_bytes, validate_file_id};

use crate::wire::{ChunkFrame, ChunkReply, read_frame, write_reply};
use crate::{ChunkChannelError, REQUEST_TIMEOUT};

/// Chunk receiver. Assembled artifacts land in `upload_dir`; in-flight
/// parts live under `staging_dir/<file_id>/`.
pub struct ChunkReceiver {
    upload_dir: PathBuf,
    staging_dir: PathBuf,
    catalog: Catalog,
    cancel: CancellationToken,
}

impl ChunkReceiver {
    pub fn new(
        upload_dir: PathBuf,
        staging_dir: PathBuf,
        catalog: Catalog,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            upload_dir,
            staging_dir,
            catalog,
            cancel,
        }
    }

    /// Binds the listening socket.
    pub async fn listen(&self, addr: SocketAddr) -> Result<TcpListener, ChunkChannelError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "chunk receiver listening");
        Ok(listener)
    }

    /// Accepts connections until cancelled, one task per chunk request.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ChunkChannelError> {
        let receiver = Arc::new(self);
        loop {
            tokio::select! {
                _ = receiver.cancel.cancelled() => {
                    info!("chunk receiver shutting down");
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

    /// Reads one chunk request and always answers with a reply.
    async fn handle_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let frame = match tokio::time::timeout(REQUEST_TIMEOUT, read_frame(&mut reader)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                warn!(%peer_addr, "unreadable chunk request: {e}");
                let reply = ChunkReply::Rejected {
                    reason: format!("malformed request: {e}"),
                };
                let _ = write_reply(&mut writer, &reply).await;
                return;
            }
            Err(_) => {
                warn!(%peer_addr, "chunk request timed out");
                return;
            }
        };

        let reply = match self.process_chunk(&frame).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%peer_addr, file_id = %frame.file_id, "error while processing chunk: {e}");
                ChunkReply::Rejected {
                    reason: "server error".into(),
                }
            }
        };

        if let ChunkReply::Rejected { reason } = &reply {
            warn!(%peer_addr, file_id = %frame.file_id, index = frame.index, reason = %reason, "chunk rejected");
        }
        if let Err(e) = write_reply(&mut writer, &reply).await {
            debug!(%peer_addr, "failed to send reply: {e}");
        }
    }

    /// Verifies and stages one chunk, assembling the artifact when the
    /// received index set covers `0..total`.
    ///
    /// Returns `Ok(Rejected(..))` for contract-level refusals and `Err`
    /// for internal faults.
    async fn process_chunk(&self, frame: &ChunkFrame) -> Result<ChunkReply, ChunkChannelError> {
        // Metadata validation first: a malformed request must create no
        // partial state.
        if let Err(e) = validate_file_id(&frame.file_id) {
            return Ok(ChunkReply::Rejected {
                reason: e.to_string(),
            });
        }
        if frame.sender.is_empty() {
            return Ok(ChunkReply::Rejected {
                reason: "empty sender identity".into(),
            });
        }
        if frame.total == 0 {
            return Ok(ChunkReply::Rejected {
                reason: "total chunk count must be at least 1".into(),
            });
        }
        if frame.index >= frame.total {
            return Ok(ChunkReply::Rejected {
                reason: format!(
                    "chunk index {} out of range for total {}",
                    frame.index, frame.total
                ),
            });
        }

        // Already-complete identifier: short-circuit without verifying
        // or writing anything, so sender retries are safe.
        let artifact_path = self.upload_dir.join(&frame.file_id);
        if artifact_path.exists() {
            return Ok(ChunkReply::Rejected {
                reason: "file already exists".into(),
            });
        }

        // VERIFYING: the hash is recomputed from the received bytes, the
        // declared value is never trusted.
        let actual = checksum_bytes(&frame.payload);
        if actual != frame.checksum {
            return Ok(ChunkReply::Rejected {
                reason: "hash mismatch".into(),
            });
        }

        // Stage the part; re-delivery of an index overwrites idempotently.
        // A racing assembly may sweep the staging directory away anywhere
        // in here, so failures and gaps are re-checked against the
        // artifact, whose existence is authoritative.
        let staging = self.staging_dir.join(&frame.file_id);
        let staged = match self.stage_part(&staging, frame).await {
            Ok(staged) => staged,
            Err(e) => {
                if artifact_path.exists() {
                    return Ok(ChunkReply::Complete {
                        file_id: frame.file_id.clone(),
                    });
                }
                return Err(e);
            }
        };

        // Completion check: the artifact is assembled by whichever chunk
        // closes the last gap, regardless of arrival order.
        if !(0..frame.total).all(|i| staged.contains(&i)) {
            if artifact_path.exists() {
                return Ok(ChunkReply::Complete {
                    file_id: frame.file_id.clone(),
                });
            }
            return Ok(ChunkReply::Incomplete {
                chunk_index: frame.index,
            });
        }

        self.assemble(frame, &staging, &artifact_path).await?;
        Ok(ChunkReply::Complete {
            file_id: frame.file_id.clone(),
        })
    }

    /// Writes one part file and returns the staged index set.
    async fn stage_part(
        &self,
        staging: &std::path::Path,
        frame: &ChunkFrame,
    ) -> Result<BTreeSet<u32>, ChunkChannelError> {
        tokio::fs::create_dir_all(staging).await?;
        let part_path = staging.join(format!("{}.part", frame.index));
        tokio::fs::write(&part_path, &frame.payload).await?;

        debug!(
            file_id = %frame.file_id,
            index = frame.index,
            total = frame.total,
            bytes = frame.payload.len(),
            "chunk staged"
        );

        staged_indices(staging).await
    }

    /// Concatenates parts in index order into the final artifact, then
    /// removes the staging directory and appends the catalog row.
    async fn assemble(
        &self,
        frame: &ChunkFrame,
        staging: &std::path::Path,
        artifact_path: &std::path::Path,
    ) -> Result<(), ChunkChannelError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        // The artifact is claimed with an atomic create-new open: when
        // two chunks close the last gap at the same time, exactly one
        // connection assembles and catalogs, the other observes the
        // already-complete file.
        let mut artifact = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(artifact_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!(file_id = %frame.file_id, "artifact already assembled");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        for index in 0..frame.total {
            let part = staging.join(format!("{index}.part"));
            let data = tokio::fs::read(&part).await?;
            tokio::io::AsyncWriteExt::write_all(&mut artifact, &data).await?;
        }
        tokio::io::AsyncWriteExt::flush(&mut artifact).await?;
        drop(artifact);

        if let Err(e) = tokio::fs::remove_dir_all(staging).await {
            warn!(staging = %staging.display(), "failed to remove staging directory: {e}");
        }

        // `<timestamp>_<name>` identifiers carry the original name after
        // the first underscore; bare identifiers are their own name.
        let original_name = frame
            .file_id
            .split_once('_')
            .map(|(_, name)| name)
            .unwrap_or(&frame.file_id);
        let record = CatalogRecord::now(&frame.file_id, original_name, &frame.sender);
        self.catalog.append(&record)?;

        info!(
            file_id = %frame.file_id,
            sender = %frame.sender,
            total = frame.total,
            "file assembled and cataloged"
        );
        Ok(())
    }
}

/// Collects the chunk indices currently staged in `staging`.
async fn staged_indices(staging: &std::path::Path) -> Result<BTreeSet<u32>, ChunkChannelError> {
    let mut indices = BTreeSet::new();
    let mut entries = tokio::fs::read_dir(staging).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(stem) = name.strip_suffix(".part")
            && let Ok(index) = stem.parse::<u32>()
        {
            indices.insert(index);
        }
    }
    Ok(indices)
}
