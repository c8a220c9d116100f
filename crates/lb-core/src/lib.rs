//! lb-core: Shared types, traits, and utilities for logbounce
//!
//! This crate provides the foundational types used across all logbounce crates:
//! the interleaved stereo PCM buffers produced by the render loop, the
//! little-endian sample codec used for scratch storage, monotonic stage
//! progress, and the [`SampleSink`] seam implemented by encoders and devices.

mod progress;
mod sample;
mod sink;

pub use progress::*;
pub use sample::*;
pub use sink::*;

/// Native output rate of the OPL-family synthesis engine
pub const NATIVE_SAMPLE_RATE: u32 = 49_700;

/// Output channel count (interleaved stereo)
pub const CHANNELS: u16 = 2;

/// Bits per integer PCM sample
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per stereo frame of integer PCM (2 channels × 16 bit)
pub const FRAME_BYTES: usize = 4;
