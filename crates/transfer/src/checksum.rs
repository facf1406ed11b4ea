//! SHA-256 checksum helpers.
//!
//! Checksums are always computed locally from bytes actually read or
//! written; the transport's declared hash is never trusted.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file, streamed, and returns the
/// hex-encoded digest.
pub fn file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHECKSUM_HEX_LEN;

    #[test]
    fn checksum_bytes_deterministic() {
        let c1 = checksum_bytes(b"hello world");
        let c2 = checksum_bytes(b"hello world");
        assert_eq!(c1, c2);
        assert_eq!(c1.len(), CHECKSUM_HEX_LEN);
    }

    #[test]
    fn checksum_bytes_differs_per_input() {
        assert_ne!(checksum_bytes(b"hello"), checksum_bytes(b"world"));
    }

    #[test]
    fn file_checksum_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.log");
        let data = b"2024-01-01 00:00:00 boot\n";
        std::fs::write(&path, data).unwrap();

        assert_eq!(file_checksum(&path).unwrap(), checksum_bytes(data));
    }

    #[test]
    fn file_checksum_missing_file() {
        let result = file_checksum(Path::new("/nonexistent/sample.log"));
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
