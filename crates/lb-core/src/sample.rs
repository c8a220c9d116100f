//! Sample types and PCM buffer definitions

use serde::{Deserialize, Serialize};

use crate::{FRAME_BYTES, NATIVE_SAMPLE_RATE};

/// Divisor used when projecting 16-bit integer samples into the float domain
pub const I16_SCALE: f32 = 32768.0;

/// Stereo sample pair as produced by the synthesis engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    #[inline]
    pub const fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn mono(value: i16) -> Self {
        Self {
            left: value,
            right: value,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRATCH SAMPLE CODEC
// ═══════════════════════════════════════════════════════════════════════════════

/// Sample type that can be persisted to a scratch region as little-endian bytes
pub trait ScratchSample: Copy + Default + Send + 'static {
    /// Encoded width in bytes
    const BYTES: usize;

    /// Write the little-endian encoding into `out` (exactly `BYTES` long)
    fn write_le(self, out: &mut [u8]);

    /// Decode from exactly `BYTES` little-endian bytes
    fn read_le(bytes: &[u8]) -> Self;
}

impl ScratchSample for i16 {
    const BYTES: usize = 2;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl ScratchSample for f32 {
    const BYTES: usize = 4;

    #[inline]
    fn write_le(self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Encode a run of samples into a little-endian byte vector
pub fn encode_samples<S: ScratchSample>(samples: &[S]) -> Vec<u8> {
    let mut bytes = vec![0u8; samples.len() * S::BYTES];
    for (sample, out) in samples.iter().zip(bytes.chunks_exact_mut(S::BYTES)) {
        sample.write_le(out);
    }
    bytes
}

/// Decode every whole sample in `bytes`, appending to `out`.
///
/// Returns the number of trailing bytes that did not form a whole sample.
pub fn decode_samples<S: ScratchSample>(bytes: &[u8], out: &mut Vec<S>) -> usize {
    let chunks = bytes.chunks_exact(S::BYTES);
    let remainder = chunks.remainder().len();
    out.extend(chunks.map(S::read_le));
    remainder
}

// ═══════════════════════════════════════════════════════════════════════════════
// PCM BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Growable interleaved 16-bit stereo PCM buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved samples (L, R, L, R, ...)
    samples: Vec<i16>,
    /// Sample rate
    sample_rate: u32,
}

impl Default for PcmBuffer {
    fn default() -> Self {
        Self::new(NATIVE_SAMPLE_RATE)
    }
}

impl PcmBuffer {
    /// Create an empty buffer
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    /// Create buffer with capacity for `frames` stereo frames
    pub fn with_capacity(sample_rate: u32, frames: usize) -> Self {
        Self {
            samples: Vec::with_capacity(frames * 2),
            sample_rate,
        }
    }

    /// Wrap already-interleaved samples. A trailing half frame is dropped.
    pub fn from_interleaved(sample_rate: u32, mut samples: Vec<i16>) -> Self {
        if samples.len() % 2 != 0 {
            samples.pop();
        }
        Self {
            samples,
            sample_rate,
        }
    }

    /// Append one stereo frame
    #[inline]
    pub fn push_frame(&mut self, frame: Frame) {
        self.samples.push(frame.left);
        self.samples.push(frame.right);
    }

    /// Number of stereo frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Length of the buffer in bytes when serialized (4 bytes per frame)
    #[inline]
    pub fn byte_len(&self) -> u64 {
        (self.frames() * FRAME_BYTES) as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f64 / self.sample_rate as f64
        }
    }

    #[inline]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [i16] {
        &mut self.samples
    }

    /// Largest absolute sample value (as i32, so |-32768| is representable)
    pub fn peak(&self) -> i32 {
        self.samples
            .iter()
            .map(|&s| (s as i32).abs())
            .max()
            .unwrap_or(0)
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Float projection of a [`PcmBuffer`], one `f32` per integer sample
#[derive(Debug, Clone, PartialEq)]
pub struct FloatPcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl FloatPcmBuffer {
    pub fn from_interleaved(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    /// Serialized length in bytes (8 bytes per frame)
    #[inline]
    pub fn byte_len(&self) -> u64 {
        (self.samples.len() * f32::BYTES) as u64
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}
