//! Streaming linear-interpolation resampler for stereo frames

/// Stereo frame in the float domain
pub type StereoF32 = [f32; 2];

/// Converts a stereo stream from `source_rate` to `target_rate` one chunk at a
/// time. State carries across calls, so chunk boundaries are inaudible.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Source frames advanced per output frame
    step: f64,
    /// Position of the next output frame between `prev` and the next input
    pos: f64,
    prev: Option<StereoF32>,
}

impl LinearResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if target_rate == 0 {
            1.0
        } else {
            source_rate as f64 / target_rate as f64
        };
        Self {
            step,
            pos: 0.0,
            prev: None,
        }
    }

    /// True when no rate conversion is performed
    pub fn is_passthrough(&self) -> bool {
        self.step == 1.0
    }

    /// Resample `input`, appending output frames to `out`
    pub fn process(&mut self, input: &[StereoF32], out: &mut Vec<StereoF32>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }

        for &frame in input {
            let Some(prev) = self.prev else {
                self.prev = Some(frame);
                continue;
            };

            while self.pos < 1.0 {
                let t = self.pos as f32;
                out.push([
                    prev[0] + (frame[0] - prev[0]) * t,
                    prev[1] + (frame[1] - prev[1]) * t,
                ]);
                self.pos += self.step;
            }
            self.pos -= 1.0;
            self.prev = Some(frame);
        }
    }

    /// Emit the held last frame, if any, and reset
    pub fn flush(&mut self, out: &mut Vec<StereoF32>) {
        if let Some(prev) = self.prev.take()
            && self.pos < 1.0
        {
            out.push(prev);
        }
        self.pos = 0.0;
    }
}
