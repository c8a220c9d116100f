//! Synthesis engine seam
//!
//! The sound-chip emulator and the log-format parsers live outside this crate.
//! A [`SynthBackend`] turns raw log bytes into a [`SynthSession`]; the render
//! loop drives the session until it reports [`Advance::Finished`].

use lb_core::Frame;

use crate::error::EngineError;
use crate::formats::LogFormat;

/// Result of stepping a session by one command burst
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Advance {
    /// The command stream is exhausted
    Finished,
    /// Render this many seconds of audio before the next advance
    Pending(f64),
}

/// One parsed command stream bound to an engine instance
pub trait SynthSession {
    /// Apply the next burst of register writes
    fn advance(&mut self) -> Result<Advance, EngineError>;

    /// Produce the next stereo frame
    fn read_frame(&mut self) -> Frame;

    /// Bytes of the command stream consumed so far
    fn offset(&self) -> usize;

    /// MIDI transcript, when the session was opened with `capture_midi`
    fn take_midi(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Options forwarded to the backend when a session is opened
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Record a MIDI transcript while rendering
    pub capture_midi: bool,
    /// Only the MIDI transcript is wanted; audio frames will not be read
    pub only_midi: bool,
    /// External instrument bank (MUS only)
    pub instrument_bank: Option<Vec<u8>>,
}

/// Factory for sessions (parser + engine)
pub trait SynthBackend {
    fn open(
        &self,
        format: LogFormat,
        data: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn SynthSession + Send>, EngineError>;
}

impl<B: SynthBackend + ?Sized> SynthBackend for &B {
    fn open(
        &self,
        format: LogFormat,
        data: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn SynthSession + Send>, EngineError> {
        (**self).open(format, data, options)
    }
}
