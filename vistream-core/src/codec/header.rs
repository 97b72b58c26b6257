//! Fixed 16-byte message header.

use bytes::{Buf, BufMut};

use crate::error::StreamError;

/// Magic marker opening every frame message.
pub const MAGIC: [u8; 4] = *b"VSTR";

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;

/// Number of array records in a version-1 message.
pub const RECORD_COUNT: u16 = 4;

/// Encoded size of [`MessageHeader`].
pub const HEADER_SIZE: usize = 16;

/// Header preceding the four array records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub record_count: u16,
    /// Bytes following the header.
    pub body_length: u64,
}

impl MessageHeader {
    pub fn new(body_length: u64) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            record_count: RECORD_COUNT,
            body_length,
        }
    }

    pub fn write(&self, dst: &mut impl BufMut) {
        dst.put_slice(&MAGIC);
        dst.put_u16_le(self.version);
        dst.put_u16_le(self.record_count);
        dst.put_u64_le(self.body_length);
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.write(&mut &mut out[..]);
        out
    }

    /// Parse the header at the start of `bytes`.
    ///
    /// The magic is checked against however many bytes are present, so a
    /// foreign payload is reported as malformed even when it is shorter
    /// than a header. A correct but incomplete header is truncated.
    pub fn parse(bytes: &[u8]) -> Result<Self, StreamError> {
        let present = bytes.len().min(MAGIC.len());
        if bytes[..present] != MAGIC[..present] {
            return Err(StreamError::malformed("missing or unrecognised magic marker"));
        }
        if bytes.len() < HEADER_SIZE {
            return Err(StreamError::TruncatedMessage {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[MAGIC.len()..HEADER_SIZE];
        let version = buf.get_u16_le();
        let record_count = buf.get_u16_le();
        let body_length = buf.get_u64_le();

        if version != PROTOCOL_VERSION {
            return Err(StreamError::malformed(format!(
                "unsupported protocol version {version} (expected {PROTOCOL_VERSION})"
            )));
        }
        if record_count != RECORD_COUNT {
            return Err(StreamError::malformed(format!(
                "expected {RECORD_COUNT} records, header declares {record_count}"
            )));
        }

        Ok(Self {
            version,
            record_count,
            body_length,
        })
    }

    /// Header plus body, or `None` if it does not fit in memory.
    pub fn total_length(&self) -> Option<usize> {
        usize::try_from(self.body_length)
            .ok()
            .and_then(|body| body.checked_add(HEADER_SIZE))
    }
}
