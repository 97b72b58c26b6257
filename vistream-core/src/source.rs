//! Frame producers feeding the publisher.
//!
//! A camera driver implements [`FrameSource`]; the publisher pulls from it
//! on a blocking thread, so `next_frame` may block for a whole capture
//! tick.

use std::f64::consts::TAU;

use glam::{DQuat, DVec3};

use crate::array::NdArray;
use crate::error::SourceError;
use crate::frame::{identity_transform, pose_matrix, SensorFrame};

/// A device producing one [`SensorFrame`] per capture tick.
pub trait FrameSource {
    /// Block until the next frame is ready. `Ok(None)` ends the stream.
    fn next_frame(&mut self) -> Result<Option<SensorFrame>, SourceError>;

    /// Image resolution as `(height, width)`.
    fn resolution(&self) -> (usize, usize);

    /// Short description for logs.
    fn describe(&self) -> String {
        let (h, w) = self.resolution();
        format!("{w}x{h} source")
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Settings for [`SyntheticSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub height: usize,
    pub width: usize,
    /// Rows of the point cloud.
    pub points: usize,
    /// Frames reported with the identity pose before odometry "converges".
    pub warmup_frames: u64,
    /// Stop after this many frames; `None` runs forever.
    pub limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            height: 400,
            width: 640,
            points: 256_000,
            warmup_frames: 30,
            limit: None,
        }
    }
}

/// Deterministic stand-in for a camera: a moving gradient, a tilted depth
/// plane, a point grid and a camera circling the origin.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_index: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Result<Self, SourceError> {
        if config.height == 0 || config.width == 0 {
            return Err(SourceError::Unavailable(format!(
                "resolution {}x{} has no pixels",
                config.width, config.height
            )));
        }
        Ok(Self {
            config,
            frame_index: 0,
        })
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_index
    }

    /// Build frame number `index` without advancing the source.
    pub fn frame_at(&self, index: u64) -> Result<SensorFrame, SourceError> {
        let SyntheticConfig {
            height: h,
            width: w,
            points: n,
            ..
        } = self.config;
        let shift = (index % 256) as usize;

        let mut rgb = Vec::with_capacity(h * w * 3);
        for y in 0..h {
            for x in 0..w {
                rgb.push(((x + shift) % 256) as u8);
                rgb.push(((y + shift) % 256) as u8);
                rgb.push(((x + y) % 256) as u8);
            }
        }

        let mut depth = Vec::with_capacity(h * w);
        for y in 0..h {
            for x in 0..w {
                depth.push((500 + x + 2 * y + shift) as u16);
            }
        }

        let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
        let mut pointcloud = Vec::with_capacity(n * 3);
        for i in 0..n {
            let u = (i % cols) as f32 / cols as f32;
            let v = (i / cols) as f32 / cols as f32;
            pointcloud.extend_from_slice(&[u - 0.5, v - 0.5, 1.0 + 0.25 * u]);
        }

        let transform = if index < self.config.warmup_frames {
            identity_transform()
        } else {
            let angle = (index - self.config.warmup_frames) as f64 * TAU / 300.0;
            pose_matrix(
                DQuat::from_rotation_y(angle),
                DVec3::new(angle.cos(), 0.0, angle.sin()),
            )
        };

        let invalid = |e: crate::error::StreamError| SourceError::InvalidFrame(e.to_string());
        SensorFrame::new(
            NdArray::from_u8(vec![h, w, 3], rgb).map_err(invalid)?,
            NdArray::from_u16(vec![h, w], depth).map_err(invalid)?,
            NdArray::from_f32(vec![n, 3], pointcloud).map_err(invalid)?,
            transform,
        )
        .map_err(invalid)
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<SensorFrame>, SourceError> {
        if self.config.limit.is_some_and(|limit| self.frame_index >= limit) {
            return Ok(None);
        }
        let frame = self.frame_at(self.frame_index)?;
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (usize, usize) {
        (self.config.height, self.config.width)
    }

    fn describe(&self) -> String {
        format!(
            "synthetic {}x{} with {} points",
            self.config.width, self.config.height, self.config.points
        )
    }
}
