//! Tertulia Core - media primitives for the conference bridge
//!
//! This crate provides the foundational building blocks shared by the bridge
//! engine and the media readers, designed for real-time processing with zero
//! allocation in the mixing path once buffers are warm.
//!
//! # Core Abstractions
//!
//! ## Frames
//!
//! - [`Frame`] / [`FrameKind`] - the reusable media buffer exchanged with
//!   ports; a frame of kind [`FrameKind::None`] means "no media this tick"
//!   and mixes as silence
//!
//! ## Level Adjustment
//!
//! - [`LevelAdj`] - the integer gain law `out = in * (adj + 128) / 128`
//!   (`-128` mutes, `0` is identity, `+128` doubles)
//! - [`saturate16`] - clamp a wide accumulator sample to signed 16-bit
//!
//! ## Companding
//!
//! - G.711 codecs: [`linear_to_ulaw`], [`ulaw_to_linear`],
//!   [`linear_to_alaw`], [`alaw_to_linear`]
//!
//! ## Metering
//!
//! - [`avg_signal`] / [`SignalMeter`] - per-frame signal level on the
//!   perceptual 0..=255 scale used by VU displays
//!
//! ## Rate and Frame-size Adaptation
//!
//! - [`Resampler`] - stateful rational resampler (windowed-sinc or linear)
//! - [`SampleRing`] - sample ring buffer for ptime adaptation
//!
//! # Design Principles
//!
//! - **Real-time safe**: no allocations in per-tick paths after warm-up
//! - **Integer-exact**: gain and saturation follow the wide-accumulate,
//!   truncate-then-clamp arithmetic the wire formats expect

pub mod companding;
pub mod frame;
pub mod gain;
pub mod level;
pub mod resample;
pub mod ring;

pub use companding::{alaw_to_linear, linear_to_alaw, linear_to_ulaw, ulaw_to_linear};
pub use frame::{Frame, FrameKind};
pub use gain::{LevelAdj, saturate16};
pub use level::{SignalMeter, avg_signal};
pub use resample::{ResampleQuality, Resampler};
pub use ring::SampleRing;
