//! Streaming export tasks
//!
//! Lossy encoders and the playback device consume the scratch regions written
//! after rendering. [`pump`] reads a region chunk by chunk, decodes whole
//! frames (carrying any partial frame into the next chunk), hands them to a
//! [`SampleSink`] and only returns once the sink's `finish` has confirmed the
//! data is flushed. The next chunk is not read until the sink accepted the
//! previous one.

use std::io::{self, Read};
use std::path::Path;

use lb_core::{CHANNELS, SampleSink, ScratchSample, StageProgress, decode_samples};

use crate::config::OfflineConfig;
use crate::error::{OfflineError, OfflineResult};
use crate::formats::ExportKind;
use crate::interrupt::CancelToken;
use crate::job::JobId;
use crate::scratch::{ScratchKind, ScratchStore};

/// Boxed sink for the integer scratch region
pub type IntSink = Box<dyn SampleSink<Sample = i16, Error = OfflineError>>;

/// Boxed sink for the float scratch region
pub type FloatSink = Box<dyn SampleSink<Sample = f32, Error = OfflineError>>;

// ═══════════════════════════════════════════════════════════════════════════════
// PUMP
// ═══════════════════════════════════════════════════════════════════════════════

/// Stream `reader` into `sink`.
///
/// Progress is `bytes consumed / expected_bytes`, finishing at exactly 1.0.
/// Returns the number of bytes read.
pub fn pump<R, S>(
    reader: &mut R,
    expected_bytes: u64,
    chunk_bytes: usize,
    sink: &mut S,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(f64),
) -> OfflineResult<u64>
where
    R: Read + ?Sized,
    S: SampleSink + ?Sized,
    OfflineError: From<S::Error>,
{
    let frame_bytes = <S::Sample as ScratchSample>::BYTES * CHANNELS as usize;
    let mut chunk = vec![0u8; chunk_bytes.max(frame_bytes)];
    let mut pending: Vec<u8> = Vec::with_capacity(chunk.len() + frame_bytes);
    let mut samples: Vec<S::Sample> = Vec::new();
    let mut progress = StageProgress::new();
    let mut consumed = 0u64;

    loop {
        cancel.check()?;

        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(OfflineError::Scratch(format!("Read failed: {}", e))),
        };
        consumed += n as u64;
        pending.extend_from_slice(&chunk[..n]);

        let whole = pending.len() / frame_bytes * frame_bytes;
        if whole > 0 {
            samples.clear();
            decode_samples(&pending[..whole], &mut samples);
            sink.write(&samples)?;
            pending.drain(..whole);
        }

        if let Some(value) = progress.advance_ratio(consumed, expected_bytes) {
            on_progress(value);
        }
    }

    if !pending.is_empty() {
        log::warn!("Dropping {} trailing bytes of a partial frame", pending.len());
    }

    sink.finish()?;

    if let Some(value) = progress.finish() {
        on_progress(value);
    }
    Ok(consumed)
}

/// Stream one scratch region of `job` into `sink`
pub fn stream_region<S>(
    store: &ScratchStore,
    job: JobId,
    kind: ScratchKind,
    config: &OfflineConfig,
    sink: &mut S,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(f64),
) -> OfflineResult<u64>
where
    S: SampleSink + ?Sized,
    OfflineError: From<S::Error>,
{
    if <S::Sample as ScratchSample>::BYTES != kind.sample_bytes() {
        return Err(OfflineError::Scratch(format!(
            "Sink sample width {} does not match {:?} region",
            <S::Sample as ScratchSample>::BYTES,
            kind
        )));
    }

    let mut reader = store.open_reader(job, kind)?;
    let expected = reader.len();
    pump(
        &mut reader,
        expected,
        config.io_chunk_bytes,
        sink,
        cancel,
        on_progress,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINK PROVIDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Opens the sinks the streaming exports write to
pub trait SinkProvider {
    /// Sink for an export reading the integer region (MP3, playback)
    fn int_sink(
        &self,
        kind: ExportKind,
        path: Option<&Path>,
        sample_rate: u32,
        config: &OfflineConfig,
    ) -> OfflineResult<IntSink>;

    /// Sink for an export reading the float region (Ogg)
    fn float_sink(
        &self,
        kind: ExportKind,
        path: Option<&Path>,
        sample_rate: u32,
        config: &OfflineConfig,
    ) -> OfflineResult<FloatSink>;
}

/// Real encoders and the audio device, as enabled by cargo features
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeSinks;

impl SinkProvider for NativeSinks {
    fn int_sink(
        &self,
        kind: ExportKind,
        path: Option<&Path>,
        sample_rate: u32,
        config: &OfflineConfig,
    ) -> OfflineResult<IntSink> {
        match kind {
            ExportKind::Mp3 => open_mp3(require_path(kind, path)?, sample_rate, config),
            ExportKind::Play => open_playback(sample_rate, config),
            _ => Err(OfflineError::InvalidConfig(format!(
                "{} does not stream integer PCM",
                kind
            ))),
        }
    }

    fn float_sink(
        &self,
        kind: ExportKind,
        path: Option<&Path>,
        sample_rate: u32,
        config: &OfflineConfig,
    ) -> OfflineResult<FloatSink> {
        match kind {
            ExportKind::Ogg => open_ogg(require_path(kind, path)?, sample_rate, config),
            _ => Err(OfflineError::InvalidConfig(format!(
                "{} does not stream float PCM",
                kind
            ))),
        }
    }
}

fn require_path(kind: ExportKind, path: Option<&Path>) -> OfflineResult<&Path> {
    path.ok_or_else(|| OfflineError::InvalidConfig(format!("{} export needs an output path", kind)))
}

#[cfg(feature = "mp3")]
fn open_mp3(path: &Path, sample_rate: u32, config: &OfflineConfig) -> OfflineResult<IntSink> {
    Ok(Box::new(crate::encoder::Mp3FileSink::create(
        path,
        sample_rate,
        &config.mp3,
    )?))
}

#[cfg(not(feature = "mp3"))]
fn open_mp3(_path: &Path, _sample_rate: u32, _config: &OfflineConfig) -> OfflineResult<IntSink> {
    Err(OfflineError::ExportUnavailable(ExportKind::Mp3.to_string()))
}

#[cfg(feature = "ogg")]
fn open_ogg(path: &Path, sample_rate: u32, config: &OfflineConfig) -> OfflineResult<FloatSink> {
    Ok(Box::new(crate::encoder::OggFileSink::create(
        path,
        sample_rate,
        &config.ogg,
    )?))
}

#[cfg(not(feature = "ogg"))]
fn open_ogg(_path: &Path, _sample_rate: u32, _config: &OfflineConfig) -> OfflineResult<FloatSink> {
    Err(OfflineError::ExportUnavailable(ExportKind::Ogg.to_string()))
}

#[cfg(feature = "playback")]
fn open_playback(sample_rate: u32, config: &OfflineConfig) -> OfflineResult<IntSink> {
    let mut options = lb_audio::PlaybackOptions {
        source_rate: sample_rate,
        ..Default::default()
    }
    .with_ring_frames(config.playback.ring_frames);
    options.device_name = config.playback.device.clone();
    Ok(Box::new(DeviceSink(lb_audio::PlaybackSink::open(&options)?)))
}

#[cfg(not(feature = "playback"))]
fn open_playback(_sample_rate: u32, _config: &OfflineConfig) -> OfflineResult<IntSink> {
    Err(OfflineError::ExportUnavailable(ExportKind::Play.to_string()))
}

/// Playback device with its errors mapped into the pipeline error type
#[cfg(feature = "playback")]
struct DeviceSink(lb_audio::PlaybackSink);

#[cfg(feature = "playback")]
impl SampleSink for DeviceSink {
    type Sample = i16;
    type Error = OfflineError;

    fn write(&mut self, samples: &[i16]) -> OfflineResult<()> {
        self.0.write(samples).map_err(OfflineError::from)
    }

    fn finish(&mut self) -> OfflineResult<()> {
        self.0.finish().map_err(OfflineError::from)
    }
}
