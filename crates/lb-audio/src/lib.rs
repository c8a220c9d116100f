//! lb-audio: Live playback using cpal
//!
//! Plays a rendered PCM stream on an output device. The export pipeline
//! pushes interleaved 16-bit frames into a [`PlaybackSink`]; frames are
//! resampled from the engine rate to the device rate and handed to the cpal
//! callback through a lock-free `rtrb` ring.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Export pump  │────▶│ PlaybackSink│────▶│ cpal Device │
//! │              │     │             │     │             │
//! │ - scratch    │     │ - resampler │     │ - callback  │
//! │   reader     │     │ - ring      │     │ - output    │
//! └──────────────┘     └─────────────┘     └─────────────┘
//! ```

mod device;
mod error;
mod playback;
mod resample;

pub use device::*;
pub use error::*;
pub use playback::*;
pub use resample::*;
