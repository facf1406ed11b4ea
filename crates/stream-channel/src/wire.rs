//! Fixed-width identity header and ACK/NAK reply encoding.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::StreamChannelError;

/// Encoded width of the identity header. Fixed so the receiver can read
/// it with a single exact-length read before touching the body.
pub const HEADER_LEN: usize = 1024;

/// Field separator inside the header.
const SEP: char = '|';

/// Identity of one whole-file transfer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityHeader {
    /// Sender identifier (one path component on the receiver).
    pub client_id: String,
    /// Logical path under the sender's watched root.
    pub relative_path: String,
    /// SHA-256 hex checksum of the whole file.
    pub checksum: String,
}

impl IdentityHeader {
    /// Encodes the header into its fixed-width wire form.
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], StreamChannelError> {
        for field in [&self.client_id, &self.relative_path, &self.checksum] {
            if field.contains(SEP) {
                return Err(StreamChannelError::Protocol(format!(
                    "header field contains separator: {field}"
                )));
            }
        }

        let record = format!(
            "{}{SEP}{}{SEP}{}",
            self.client_id, self.relative_path, self.checksum
        );
        if record.len() > HEADER_LEN {
            return Err(StreamChannelError::Protocol(format!(
                "header record too long: {} bytes (max {HEADER_LEN})",
                record.len()
            )));
        }

        let mut buf = [b' '; HEADER_LEN];
        buf[..record.len()].copy_from_slice(record.as_bytes());
        Ok(buf)
    }

    /// Parses a received fixed-width header.
    pub fn parse(buf: &[u8; HEADER_LEN]) -> Result<Self, StreamChannelError> {
        let record = std::str::from_utf8(buf)
            .map_err(|e| StreamChannelError::Protocol(format!("header is not UTF-8: {e}")))?
            .trim_end_matches(' ');

        let parts: Vec<&str> = record.split(SEP).collect();
        if parts.len() != 3 {
            return Err(StreamChannelError::Protocol(format!(
                "malformed header: expected 3 fields, got {}",
                parts.len()
            )));
        }

        Ok(Self {
            client_id: parts[0].to_string(),
            relative_path: parts[1].to_string(),
            checksum: parts[2].to_string(),
        })
    }
}

/// The receiver's verdict on one transfer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Transfer verified and persisted.
    Ack,
    /// Transfer rejected, with a descriptive reason.
    Nak(String),
}

/// Writes the reply and flushes. The connection is closed right after,
/// so the sender reads the reply up to EOF.
pub async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &Reply,
) -> Result<(), StreamChannelError> {
    match reply {
        Reply::Ack => writer.write_all(b"ACK").await?,
        Reply::Nak(reason) => {
            writer.write_all(format!("NAK: {reason}").as_bytes()).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

/// Reads the reply bytes until EOF and parses them.
pub async fn read_reply<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Reply, StreamChannelError> {
    let mut buf = Vec::with_capacity(64);
    reader.read_to_end(&mut buf).await?;

    let text = String::from_utf8(buf)
        .map_err(|e| StreamChannelError::Protocol(format!("reply is not UTF-8: {e}")))?;
    let text = text.trim();

    if text == "ACK" {
        Ok(Reply::Ack)
    } else if let Some(reason) = text.strip_prefix("NAK:") {
        Ok(Reply::Nak(reason.trim().to_string()))
    } else if text.is_empty() {
        Err(StreamChannelError::Protocol(
            "connection closed without a reply".into(),
        ))
    } else {
        Err(StreamChannelError::Protocol(format!(
            "unrecognized reply: {text}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> IdentityHeader {
        IdentityHeader {
            client_id: "rpi-001".into(),
            relative_path: "app/access.log".into(),
            checksum: "ab".repeat(32),
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = sample_header();
        let buf = header.encode().unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(IdentityHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn header_is_space_padded() {
        let buf = sample_header().encode().unwrap();
        assert_eq!(buf[HEADER_LEN - 1], b' ');
        assert!(buf.starts_with(b"rpi-001|app/access.log|"));
    }

    #[test]
    fn header_too_long_rejected() {
        let header = IdentityHeader {
            client_id: "edge".into(),
            relative_path: "x".repeat(HEADER_LEN),
            checksum: "ab".repeat(32),
        };
        assert!(matches!(
            header.encode(),
            Err(StreamChannelError::Protocol(_))
        ));
    }

    #[test]
    fn header_field_with_separator_rejected() {
        let header = IdentityHeader {
            client_id: "bad|id".into(),
            relative_path: "a.log".into(),
            checksum: "ab".repeat(32),
        };
        assert!(header.encode().is_err());
    }

    #[test]
    fn parse_rejects_wrong_field_count() {
        let mut buf = [b' '; HEADER_LEN];
        let record = b"only-two-fields|here";
        buf[..record.len()].copy_from_slice(record);
        assert!(matches!(
            IdentityHeader::parse(&buf),
            Err(StreamChannelError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn reply_ack_roundtrip() {
        let mut buf = Vec::new();
        write_reply(&mut buf, &Reply::Ack).await.unwrap();
        assert_eq!(&buf, b"ACK");

        let mut cursor = &buf[..];
        assert_eq!(read_reply(&mut cursor).await.unwrap(), Reply::Ack);
    }

    #[tokio::test]
    async fn reply_nak_roundtrip() {
        let mut buf = Vec::new();
        write_reply(&mut buf, &Reply::Nak("hash mismatch".into()))
            .await
            .unwrap();

        let mut cursor = &buf[..];
        assert_eq!(
            read_reply(&mut cursor).await.unwrap(),
            Reply::Nak("hash mismatch".into())
        );
    }

    #[tokio::test]
    async fn empty_reply_is_an_error() {
        let mut cursor: &[u8] = b"";
        assert!(read_reply(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn garbage_reply_is_an_error() {
        let mut cursor: &[u8] = b"MAYBE";
        assert!(read_reply(&mut cursor).await.is_err());
    }
}
