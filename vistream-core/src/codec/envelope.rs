//! Socket-level framing between one publisher and one subscriber.
//!
//! ```text
//! kind u8 │ length u32 LE │ payload [u8; length]
//! ```
//!
//! Kind 1 is the hello the publisher sends as soon as a subscriber is
//! registered; kind 2 carries one frame message verbatim.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::header::PROTOCOL_VERSION;
use crate::error::StreamError;

/// Largest payload accepted on a connection (64 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 64 * 1024 * 1024;

const PREFIX_SIZE: usize = 5;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Hello = 0x01,
    Frame = 0x02,
}

impl TryFrom<u8> for Kind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Kind::Hello),
            0x02 => Ok(Kind::Frame),
            _ => Err(StreamError::UnknownVariant {
                type_name: "EnvelopeKind",
                value: value as u64,
            }),
        }
    }
}

/// Greeting identifying the stream a connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub version: u16,
    pub stream_name: String,
}

impl Hello {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            stream_name: stream_name.into(),
        }
    }

    fn decode(mut payload: Bytes) -> Result<Self, StreamError> {
        if payload.len() < 2 {
            return Err(StreamError::Handshake(format!(
                "hello payload of {} bytes",
                payload.len()
            )));
        }
        let version = payload.get_u16_le();
        let stream_name = String::from_utf8(payload.to_vec())
            .map_err(|_| StreamError::Handshake("stream name is not UTF-8".into()))?;
        Ok(Self {
            version,
            stream_name,
        })
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Hello(Hello),
    /// An encoded frame message, not yet decoded.
    Frame(Bytes),
}

/// `tokio_util` codec for [`Envelope`]s.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_size: usize,
}

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self {
            max_size: MAX_ENVELOPE_SIZE,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PREFIX_SIZE {
            return Ok(None);
        }

        let kind = Kind::try_from(src[0])?;
        let len = u32::from_le_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_size {
            return Err(StreamError::FrameTooLarge {
                size: len,
                max: self.max_size,
            });
        }

        if src.len() < PREFIX_SIZE + len {
            src.reserve(PREFIX_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_SIZE);
        let payload = src.split_to(len).freeze();
        match kind {
            Kind::Hello => Ok(Some(Envelope::Hello(Hello::decode(payload)?))),
            Kind::Frame => Ok(Some(Envelope::Frame(payload))),
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (kind, len) = match &item {
            Envelope::Hello(h) => (Kind::Hello, 2 + h.stream_name.len()),
            Envelope::Frame(b) => (Kind::Frame, b.len()),
        };
        if len > self.max_size {
            return Err(StreamError::FrameTooLarge {
                size: len,
                max: self.max_size,
            });
        }

        dst.reserve(PREFIX_SIZE + len);
        dst.put_u8(kind as u8);
        dst.put_u32_le(len as u32);
        match item {
            Envelope::Hello(h) => {
                dst.put_u16_le(h.version);
                dst.put_slice(h.stream_name.as_bytes());
            }
            Envelope::Frame(b) => dst.put_slice(&b),
        }
        Ok(())
    }
}
