//! Fixed-size chunking with per-chunk checksums.

use std::io::Read;
use std::path::Path;

use crate::checksum::checksum_bytes;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// One fixed-size slice of a file, verified independently.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// Zero-based chunk index.
    pub index: u32,
    /// Total number of chunks for this file.
    pub total: u32,
    /// Raw chunk payload.
    pub data: Vec<u8>,
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

/// Reads a file as a sequence of indexed chunks.
///
/// The chunk count is fixed when the reader is opened; the file must not
/// grow or shrink while a transfer attempt is in flight (the sender's
/// open-file probe filters files still being appended to).
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    index: u32,
    total: u32,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used. An empty
    /// file yields a single empty chunk so a transfer unit always exists.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let total = (file_size.div_ceil(chunk_size as u64)).max(1) as u32;

        Ok(Self {
            file,
            chunk_size,
            index: 0,
            total,
        })
    }

    /// Total number of chunks this file splits into.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Reads the next chunk. Returns `None` once all chunks were read.
    pub fn next_chunk(&mut self) -> Result<Option<FileChunk>, TransferError> {
        if self.index >= self.total {
            return Ok(None);
        }

        let mut data = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data.truncate(filled);

        let chunk = FileChunk {
            index: self.index,
            total: self.total,
            checksum: checksum_bytes(&data),
            data,
        };
        self.index += 1;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn exact_multiple_of_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.log", b"AABBCCDD");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.total(), 2);

        let c0 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c0.index, 0);
        assert_eq!(c0.total, 2);
        assert_eq!(&c0.data, b"AABB");
        assert_eq!(c0.checksum, checksum_bytes(b"AABB"));

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.index, 1);
        assert_eq!(&c1.data, b"CCDD");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn ten_bytes_chunk_six_splits_six_four() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "a.log", b"0123456789");

        let mut reader = ChunkReader::new(&path, 6).unwrap();
        assert_eq!(reader.total(), 2);

        let c0 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c0.data.len(), 6);
        assert_eq!(&c0.data, b"012345");

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.data.len(), 4);
        assert_eq!(&c1.data, b"6789");
    }

    #[test]
    fn empty_file_yields_one_empty_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "empty.log", b"");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.total(), 1);

        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.index, 0);
        assert_eq!(c.total, 1);
        assert!(c.data.is_empty());
        assert_eq!(c.checksum, checksum_bytes(b""));

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "small.log", b"x");

        let mut reader = ChunkReader::new(&path, 0).unwrap();
        assert_eq!(reader.total(), 1);
        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(&c.data, b"x");
    }

    #[test]
    fn chunks_reassemble_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let original = b"The quick brown fox jumps over the lazy dog";
        let path = write_file(&dir, "fox.log", original);

        let mut reader = ChunkReader::new(&path, 10).unwrap();
        let mut assembled = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            assembled.extend_from_slice(&chunk.data);
        }
        assert_eq!(&assembled, original);
    }
}
