//! Rolling per-interval frame statistics.

use std::time::{Duration, Instant};

use vistream_core::{FrameLayout, SensorFrame};

/// Summary of one reporting interval.
#[derive(Debug, Clone, PartialEq)]
pub struct MeterReport {
    pub frames: u64,
    pub fps: f64,
    /// Frames whose pose was the identity (odometry not converged).
    pub identity_poses: u64,
    /// Raw array bytes received.
    pub bytes: u64,
    /// Layout of the newest frame, if any arrived.
    pub layout: Option<FrameLayout>,
}

/// Counts frames and emits a [`MeterReport`] once per interval.
#[derive(Debug)]
pub struct FrameMeter {
    interval: Duration,
    started: Instant,
    frames: u64,
    identity_poses: u64,
    bytes: u64,
    layout: Option<FrameLayout>,
}

impl FrameMeter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    /// Meter whose first interval begins at `now` (useful for testing).
    pub fn starting_at(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            started: now,
            frames: 0,
            identity_poses: 0,
            bytes: 0,
            layout: None,
        }
    }

    pub fn record(&mut self, frame: &SensorFrame) {
        self.frames += 1;
        self.bytes += frame.byte_len() as u64;
        if frame.pose_is_identity() {
            self.identity_poses += 1;
        }
        self.layout = Some(frame.layout());
    }

    /// Close the interval if it has elapsed at `now`.
    pub fn report_at(&mut self, now: Instant) -> Option<MeterReport> {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed < self.interval {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        let report = MeterReport {
            frames: self.frames,
            fps: if secs > 0.0 { self.frames as f64 / secs } else { 0.0 },
            identity_poses: self.identity_poses,
            bytes: self.bytes,
            layout: self.layout.take(),
        };
        self.started = now;
        self.frames = 0;
        self.identity_poses = 0;
        self.bytes = 0;
        Some(report)
    }
}

// ── Tests ────────────────────────────────────────────────────────
