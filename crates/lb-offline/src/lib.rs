//! LB-Offline — Render-and-export pipeline for sound-chip register logs
//!
//! Turns register-log files (LAA, MUS, DRO, IMF, RAW) into audio through an
//! external synthesis backend, then fans the rendered PCM out to:
//! - MIDI transcript
//! - WAV (16-bit stereo, engine rate)
//! - MP3 (LAME, feature `mp3`)
//! - Ogg Vorbis (libvorbis, feature `ogg`)
//! - Live playback (cpal, feature `playback`)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        BatchScheduler                             │
//! │                                                                   │
//! │  ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐ │
//! │  │ Render   │ → │ Normalizer │ → │ Scratch    │ → │ Exports    │ │
//! │  │ thread   │   │ (peak)     │   │ .tmp/.tmp32│   │ (in order) │ │
//! │  └──────────┘   └────────────┘   └────────────┘   └────────────┘ │
//! │                                                                   │
//! │  Jobs run one at a time; scratch files are removed after every    │
//! │  job and by the interrupt handler.                                │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lb_offline::{BatchScheduler, ExportKind, LogObserver, RenderJob};
//!
//! let scheduler = BatchScheduler::new(my_backend);
//! scheduler.install_interrupt_handler()?;
//!
//! let job = RenderJob::builder()
//!     .input("/music/D_E1M1.mus")
//!     .output_dir("/music/out")
//!     .export(ExportKind::Wav)
//!     .export(ExportKind::Mp3)
//!     .build()?;
//!
//! let report = scheduler.run(&[job], &mut LogObserver::new())?;
//! ```

mod config;
mod encoder;
mod engine;
mod error;
mod export;
mod formats;
mod interrupt;
mod job;
mod normalize;
mod pipeline;
mod project;
mod render;
mod scratch;

pub use config::*;
pub use encoder::*;
pub use engine::*;
pub use error::*;
pub use export::*;
pub use formats::*;
pub use interrupt::*;
pub use job::*;
pub use normalize::*;
pub use pipeline::*;
pub use project::*;
pub use render::*;
pub use scratch::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
