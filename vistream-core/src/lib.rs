//! # vistream-core
//!
//! Named-stream transport for synchronized RGB-D captures with camera pose.
//!
//! This crate contains:
//! - **Data model**: `NdArray`, `DType`, `SensorFrame` and pose helpers
//! - **Codec**: the self-describing frame message (`encode_frame` /
//!   `decode_frame`) and `EnvelopeCodec` for framed socket I/O via `tokio_util`
//! - **Address**: stream name → ipc socket path or tcp port
//! - **Endpoints**: `FramePublisher` (rate-gated fan-out) and
//!   `FrameSubscriber` (non-blocking, latest frame wins)
//! - **Source**: the `FrameSource` trait a device driver implements, plus a
//!   synthetic source
//! - **Error**: `StreamError`, a typed `thiserror` hierarchy

pub mod address;
pub mod array;
pub mod codec;
pub mod error;
pub mod frame;
pub mod network;
pub mod publisher;
pub mod rate;
pub mod source;
pub mod state;
pub mod subscriber;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use address::{AddressConfig, StreamAddress, TransportScheme};
pub use array::{ArrayData, DType, NdArray};
pub use codec::{decode_frame, encode_frame, Envelope, EnvelopeCodec, Hello};
pub use error::{SourceError, StreamError};
pub use frame::{
    identity_transform, pose_from_wxyz, pose_matrix, Field, FrameLayout, SensorFrame,
    SensorFrameBuilder,
};
pub use publisher::{FramePublisher, PublishOutcome, PublisherConfig, PublisherStats};
pub use rate::RateLimiter;
pub use source::{FrameSource, SyntheticConfig, SyntheticSource};
pub use state::EndpointPhase;
pub use subscriber::{FrameSubscriber, SubscriberConfig, SubscriberStats};
