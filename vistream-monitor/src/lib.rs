//! # vistream-monitor
//!
//! Console subscriber that polls a stream and summarizes what arrives:
//! frame rate, layout and how many poses were still the identity.

pub mod meter;
