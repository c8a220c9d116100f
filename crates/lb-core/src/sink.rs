//! Streaming sample sink trait
//!
//! Implemented by the lossy encoders in `lb-offline` and by the live playback
//! device in `lb-audio`. The export pump reads a scratch region chunk by chunk
//! and pushes every decoded chunk through `write` before reading the next one,
//! so a sink that blocks applies backpressure to the reader.

use crate::ScratchSample;

/// Consumer of interleaved stereo samples
pub trait SampleSink {
    /// Sample representation this sink consumes
    type Sample: ScratchSample;

    /// Sink-specific failure
    type Error: std::fmt::Display;

    /// Consume a run of interleaved samples. May block until there is room.
    fn write(&mut self, samples: &[Self::Sample]) -> Result<(), Self::Error>;

    /// Flush everything written so far. Returns once the data is durable
    /// (file synced) or audible (device drained).
    fn finish(&mut self) -> Result<(), Self::Error>;
}

impl<S: SampleSink + ?Sized> SampleSink for Box<S> {
    type Sample = S::Sample;
    type Error = S::Error;

    fn write(&mut self, samples: &[Self::Sample]) -> Result<(), Self::Error> {
        (**self).write(samples)
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        (**self).finish()
    }
}
