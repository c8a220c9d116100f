//! Integer to float PCM projection

use lb_core::{FloatPcmBuffer, I16_SCALE, PcmBuffer};

/// Project `pcm` into the float domain (`sample / 32768`)
pub fn project_to_float(pcm: &PcmBuffer) -> FloatPcmBuffer {
    let samples = pcm
        .samples()
        .iter()
        .map(|&s| s as f32 / I16_SCALE)
        .collect();
    FloatPcmBuffer::from_interleaved(pcm.sample_rate(), samples)
}

/// Inverse projection for consumers that take 16-bit input
#[inline]
pub fn float_to_i16(sample: f32) -> i16 {
    (sample * I16_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
