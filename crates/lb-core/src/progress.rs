//! Monotonic per-stage progress tracking

/// Progress fraction for one pipeline stage.
///
/// Reported values never move backwards and are clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageProgress {
    fraction: f64,
    finished: bool,
}

impl StageProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current fraction
    #[inline]
    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Offer a new fraction. Returns the value to report if it moved forward.
    pub fn advance(&mut self, fraction: f64) -> Option<f64> {
        if self.finished || !fraction.is_finite() {
            return None;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.fraction {
            self.fraction = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Offer `done / total`; a zero total counts as no progress
    pub fn advance_ratio(&mut self, done: u64, total: u64) -> Option<f64> {
        if total == 0 {
            return None;
        }
        self.advance(done as f64 / total as f64)
    }

    /// Force the stage to exactly 1.0. Returns `Some(1.0)` unless 1.0 was
    /// already reported.
    pub fn finish(&mut self) -> Option<f64> {
        let already = self.finished || self.fraction >= 1.0;
        self.finished = true;
        self.fraction = 1.0;
        if already { None } else { Some(1.0) }
    }
}
