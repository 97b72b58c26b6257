//! Endpoint lifecycle shared by publisher and subscriber.
//!
//! ```text
//!  Closed ──open──► Open ──close──► Closed
//! ```
//!
//! An endpoint is created open. Closing is idempotent; there is no
//! re-open, a new endpoint is created instead.

use std::time::{Duration, Instant};

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointPhase {
    /// Initial and terminal state.
    #[default]
    Closed,

    /// Bound (publisher) or connected (subscriber).
    Open {
        /// When the endpoint entered `Open`.
        since: Instant,
    },
}

impl std::fmt::Display for EndpointPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open { .. } => write!(f, "Open"),
        }
    }
}

impl EndpointPhase {
    /// A freshly opened endpoint.
    pub fn opened() -> Self {
        Self::Open {
            since: Instant::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// How long the endpoint has been open; `None` once closed.
    pub fn uptime(&self) -> Option<Duration> {
        match self {
            Self::Open { since } => Some(since.elapsed()),
            Self::Closed => None,
        }
    }

    /// Fail with [`StreamError::NotConnected`] unless open.
    pub fn ensure_open(&self) -> Result<(), StreamError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StreamError::NotConnected)
        }
    }

    /// Transition to `Closed`.
    ///
    /// Returns the time spent open, or `None` if already closed.
    pub fn close(&mut self) -> Option<Duration> {
        let uptime = self.uptime();
        *self = Self::Closed;
        uptime
    }
}
