//! Two-pass peak normalization of 16-bit PCM
//!
//! Pass 1 scans for the largest absolute sample (progress 0.0 → 0.5).
//! Pass 2 rescales every sample by `target_peak / peak` in place
//! (progress 0.5 → 1.0). Silence is left untouched with a gain of 1.

use lb_core::{PcmBuffer, StageProgress};
use serde::{Deserialize, Serialize};

use crate::config::NormalizeConfig;
use crate::error::OfflineResult;
use crate::interrupt::CancelToken;

/// Outcome of a normalization run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    /// Absolute peak before scaling
    pub peak: i32,
    /// Applied multiplier
    pub gain: f64,
}

/// Gain that maps `peak` onto `target_peak`
pub fn gain_for_peak(target_peak: i32, peak: i32) -> f64 {
    if peak <= 0 {
        1.0
    } else {
        target_peak as f64 / peak as f64
    }
}

/// Scale one sample, rounding to nearest and saturating to the i16 range
#[inline]
pub fn scale_sample(sample: i16, gain: f64) -> i16 {
    (sample as f64 * gain)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Peak normalizer
pub struct Normalizer {
    target_peak: i32,
    block_size: usize,
}

impl Normalizer {
    pub fn new(config: &NormalizeConfig, block_size: usize) -> Self {
        Self {
            target_peak: config.target_peak,
            block_size: block_size.max(1),
        }
    }

    pub fn target_peak(&self) -> i32 {
        self.target_peak
    }

    /// Normalize `pcm` in place
    pub fn normalize(
        &self,
        pcm: &mut PcmBuffer,
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(f64),
    ) -> OfflineResult<NormalizationResult> {
        let mut progress = StageProgress::new();
        let mut report = |fraction: f64| {
            if let Some(value) = progress.advance(fraction) {
                on_progress(value);
            }
        };

        let total = pcm.samples().len() as u64;

        // Pass 1: peak scan
        let mut peak = 0i32;
        let mut scanned = 0u64;
        for block in pcm.samples().chunks(self.block_size) {
            cancel.check()?;
            peak = block
                .iter()
                .map(|&s| (s as i32).abs())
                .fold(peak, i32::max);
            scanned += block.len() as u64;
            report(0.5 * scanned as f64 / total as f64);
        }

        let gain = gain_for_peak(self.target_peak, peak);
        log::debug!("Peak {} -> gain {:.4}", peak, gain);

        // Pass 2: rescale
        if gain != 1.0 {
            let mut written = 0u64;
            for block in pcm.samples_mut().chunks_mut(self.block_size) {
                cancel.check()?;
                for sample in block.iter_mut() {
                    *sample = scale_sample(*sample, gain);
                }
                written += block.len() as u64;
                report(0.5 + 0.5 * written as f64 / total as f64);
            }
        }

        drop(report);
        if let Some(value) = progress.finish() {
            on_progress(value);
        }

        Ok(NormalizationResult { peak, gain })
    }
}
