//! Domain-specific error types for the vistream protocol.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! No panics on invalid input. Every error is typed, and the endpoints
//! decide which ones are recovered locally (corrupt wire data, transient
//! I/O) and which ones surface to the caller (lifecycle misuse).

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the vistream protocol.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Producer-side Errors ─────────────────────────────────────
    /// A frame field is missing, has the wrong dtype / dimensionality,
    /// or its storage does not match its declared shape.
    #[error("cannot encode {field}: {reason}")]
    Encoding { field: &'static str, reason: String },

    // ── Wire Errors ──────────────────────────────────────────────
    /// The payload does not carry a recognised magic / version, or one
    /// of its records is internally inconsistent.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The payload ends before the length its header declares.
    #[error("truncated message: expected {expected} bytes, got {actual}")]
    TruncatedMessage { expected: usize, actual: usize },

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// An envelope exceeded the transport limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    // ── Endpoint Lifecycle Errors ────────────────────────────────
    /// The stream address is already owned by a live publisher, or the
    /// OS refused the bind.
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// No publisher is reachable at the stream address.
    #[error("cannot connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The publisher answered with an unexpected hello.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// `publish` / `get_next` was called on a closed endpoint.
    #[error("endpoint is not connected")]
    NotConnected,

    /// The stream name cannot be turned into an address.
    #[error("invalid stream name {name:?}: {reason}")]
    InvalidStreamName { name: String, reason: &'static str },

    /// The requested frame rate is not usable.
    #[error("invalid frame rate: {0} fps")]
    InvalidFrameRate(u32),

    /// The requested transport scheme is not available on this platform.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(&'static str),

    // ── Transport Errors ─────────────────────────────────────────
    /// The socket layer reported an error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The frame source failed.
    #[error("frame source error: {0}")]
    Source(#[from] SourceError),
}

impl StreamError {
    /// Shorthand for [`StreamError::Encoding`].
    pub fn encoding(field: &'static str, reason: impl Into<String>) -> Self {
        StreamError::Encoding {
            field,
            reason: reason.into(),
        }
    }

    /// Shorthand for [`StreamError::MalformedMessage`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        StreamError::MalformedMessage(reason.into())
    }

    /// Whether this error describes a corrupt message that the subscriber
    /// drops without tearing down its link.
    pub fn is_corrupt_message(&self) -> bool {
        matches!(
            self,
            StreamError::MalformedMessage(_)
                | StreamError::TruncatedMessage { .. }
                | StreamError::UnknownVariant { .. }
        )
    }
}

// ── SourceError ──────────────────────────────────────────────────

/// Typed error for the frame source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The device could not be opened.
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// A single capture tick failed; the next one may succeed.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// The produced frame violated the data model.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The device I/O layer reported an error.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}
