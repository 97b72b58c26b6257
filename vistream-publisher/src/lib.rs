//! # vistream-publisher
//!
//! Foreground service that binds a named stream and publishes frames from
//! a [`FrameSource`](vistream_core::FrameSource) at the configured rate.
//! Without a camera driver linked in, frames come from the synthetic
//! source.

pub mod config;
pub mod service;
