//! Send-rate gate for the publisher.
//!
//! A send is admitted when at least one interval has passed since the
//! previous admitted send. Rejected sends are dropped by the caller, not
//! queued, so consecutive admitted sends are always one interval apart.

use std::time::{Duration, Instant};

use crate::error::StreamError;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// Gate at `fps` sends per second. `fps` must be at least 1.
    pub fn new(fps: u32) -> Result<Self, StreamError> {
        if fps == 0 {
            return Err(StreamError::InvalidFrameRate(fps));
        }
        Ok(Self {
            interval: Duration::from_secs_f64(1.0 / fps as f64),
            last: None,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a send may happen now, without recording one.
    pub fn ready_at(&self, now: Instant) -> bool {
        match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Record a send at `now`.
    pub fn mark_at(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Time left until the next send is admitted.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.last {
            None => Duration::ZERO,
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }
}
