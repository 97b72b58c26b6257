//! Frame message codec.
//!
//! A [`SensorFrame`] travels as one self-describing message:
//!
//! ```text
//! ┌─────────────── header (16 bytes) ───────────────┐
//! │ magic "VSTR" │ version u16 │ records u16 │ body u64 │
//! └──────────────────────────────────────────────────┘
//! record × 4, in order rgb, depth, pointcloud, transform:
//!   dtype u8 │ ndim u8 │ dims u64 × ndim │ byte_length u64 │ data
//! ```
//!
//! All integers and elements are little-endian. The message is what the
//! publisher hands to the transport; [`envelope`] frames it on the socket.

pub mod envelope;
pub mod header;
pub mod record;

use bytes::{Bytes, BytesMut};

use crate::error::StreamError;
use crate::frame::{Field, SensorFrame};

pub use envelope::{Envelope, EnvelopeCodec, Hello, MAX_ENVELOPE_SIZE};
pub use header::{HEADER_SIZE, MAGIC, MessageHeader, PROTOCOL_VERSION, RECORD_COUNT};

/// Serialize `frame` into a single message.
///
/// Every field is validated first; nothing is written for an invalid frame.
pub fn encode_frame(frame: &SensorFrame) -> Result<Bytes, StreamError> {
    frame.validate()?;

    let body_len: usize = Field::ORDER
        .iter()
        .map(|&f| record::record_len(frame.field(f)))
        .sum();

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body_len);
    MessageHeader::new(body_len as u64).write(&mut buf);
    for field in Field::ORDER {
        record::write_record(&mut buf, field.name(), frame.field(field))?;
    }
    debug_assert_eq!(buf.len(), HEADER_SIZE + body_len);

    Ok(buf.freeze())
}

/// Reconstruct a frame from one message.
pub fn decode_frame(bytes: &[u8]) -> Result<SensorFrame, StreamError> {
    let header = MessageHeader::parse(bytes)?;
    let total = header.total_length().ok_or_else(|| {
        StreamError::malformed(format!("body length {} overflows", header.body_length))
    })?;

    if bytes.len() < total {
        return Err(StreamError::TruncatedMessage {
            expected: total,
            actual: bytes.len(),
        });
    }
    if bytes.len() > total {
        return Err(StreamError::malformed(format!(
            "{} trailing bytes after declared end",
            bytes.len() - total
        )));
    }

    let mut body = &bytes[HEADER_SIZE..total];
    let mut read = |field: Field| -> Result<_, StreamError> {
        let array = record::read_record(&mut body, field.name())?;
        field
            .check(&array)
            .map_err(|reason| StreamError::malformed(format!("{field}: {reason}")))?;
        Ok(array)
    };

    let rgb = read(Field::Rgb)?;
    let depth = read(Field::Depth)?;
    let pointcloud = read(Field::PointCloud)?;
    let transform = read(Field::Transform)?;

    if !body.is_empty() {
        return Err(StreamError::malformed(format!(
            "{} unread bytes after the last record",
            body.len()
        )));
    }

    let frame = SensorFrame {
        rgb,
        depth,
        pointcloud,
        transform,
    };
    frame
        .check_resolution()
        .map_err(StreamError::malformed)?;
    Ok(frame)
}
