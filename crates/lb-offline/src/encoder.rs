//! Artifact writers
//!
//! Supports:
//! - WAV (via hound), written in one pass from the in-memory PCM buffer
//! - MP3 (via mp3lame-encoder), streamed from the integer scratch region
//! - OGG Vorbis (via vorbis-encoder), streamed from the float scratch region
//! - MIDI, written verbatim from the render output

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use lb_core::{BITS_PER_SAMPLE, CHANNELS, PcmBuffer};

use crate::error::{OfflineError, OfflineResult};

/// Create `path` for writing, creating missing parent directories
pub fn create_output_file(path: &Path) -> OfflineResult<BufWriter<File>> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            OfflineError::WriteError(format!("{}: {}", parent.display(), e))
        })?;
    }
    let file = File::create(path)
        .map_err(|e| OfflineError::WriteError(format!("{}: {}", path.display(), e)))?;
    Ok(BufWriter::new(file))
}

/// Flush a buffered artifact and sync it to disk
fn finish_output_file(writer: &mut BufWriter<File>, path: &Path) -> OfflineResult<()> {
    writer
        .flush()
        .and_then(|_| writer.get_ref().sync_all())
        .map_err(|e| OfflineError::WriteError(format!("{}: {}", path.display(), e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV
// ═══════════════════════════════════════════════════════════════════════════════

/// Write `pcm` as a 16-bit stereo WAV. Returns the data chunk length.
pub fn write_wav(path: &Path, pcm: &PcmBuffer) -> OfflineResult<u64> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: pcm.sample_rate(),
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    };

    let writer = create_output_file(path)?;
    let mut wav = hound::WavWriter::new(writer, spec)?;
    for &sample in pcm.samples() {
        wav.write_sample(sample)?;
    }
    wav.finalize()?;

    Ok(pcm.byte_len())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIDI
// ═══════════════════════════════════════════════════════════════════════════════

/// Write a MIDI transcript verbatim
pub fn write_midi(path: &Path, midi: &[u8]) -> OfflineResult<u64> {
    let mut writer = create_output_file(path)?;
    writer
        .write_all(midi)
        .map_err(|e| OfflineError::WriteError(format!("{}: {}", path.display(), e)))?;
    finish_output_file(&mut writer, path)?;
    Ok(midi.len() as u64)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MP3 ENCODER (Native LAME)
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "mp3")]
pub use mp3::Mp3FileSink;

#[cfg(feature = "mp3")]
mod mp3 {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    use lb_core::{CHANNELS, SampleSink};
    use mp3lame_encoder::{Bitrate, Builder, Encoder, FlushNoGap, InterleavedPcm, Quality};

    use super::{create_output_file, finish_output_file};
    use crate::config::Mp3Config;
    use crate::error::{OfflineError, OfflineResult};

    /// Convert kbps to the nearest LAME CBR bitrate at or below it
    fn lame_bitrate(kbps: u16) -> Bitrate {
        match kbps {
            0..=79 => Bitrate::Kbps64,
            80..=95 => Bitrate::Kbps80,
            96..=111 => Bitrate::Kbps96,
            112..=127 => Bitrate::Kbps112,
            128..=159 => Bitrate::Kbps128,
            160..=191 => Bitrate::Kbps160,
            192..=223 => Bitrate::Kbps192,
            224..=255 => Bitrate::Kbps224,
            256..=319 => Bitrate::Kbps256,
            _ => Bitrate::Kbps320,
        }
    }

    /// Streaming MP3 file writer fed with interleaved stereo i16
    pub struct Mp3FileSink {
        encoder: Encoder,
        writer: BufWriter<File>,
        buffer: Vec<u8>,
        path: PathBuf,
        finished: bool,
    }

    impl Mp3FileSink {
        pub fn create(path: &Path, sample_rate: u32, config: &Mp3Config) -> OfflineResult<Self> {
            let mut builder = Builder::new().ok_or_else(|| {
                OfflineError::EncodingError("LAME encoder init failed".to_string())
            })?;

            builder.set_num_channels(CHANNELS as u8).map_err(|e| {
                OfflineError::EncodingError(format!("LAME set channels failed: {:?}", e))
            })?;
            builder.set_sample_rate(sample_rate).map_err(|e| {
                OfflineError::EncodingError(format!("LAME set sample rate failed: {:?}", e))
            })?;
            builder
                .set_brate(lame_bitrate(config.bitrate_kbps))
                .map_err(|e| {
                    OfflineError::EncodingError(format!("LAME set bitrate failed: {:?}", e))
                })?;
            builder.set_quality(Quality::Best).map_err(|e| {
                OfflineError::EncodingError(format!("LAME set quality failed: {:?}", e))
            })?;

            let encoder = builder
                .build()
                .map_err(|e| OfflineError::EncodingError(format!("LAME build failed: {:?}", e)))?;

            Ok(Self {
                encoder,
                writer: create_output_file(path)?,
                buffer: Vec::new(),
                path: path.to_path_buf(),
                finished: false,
            })
        }

        fn write_buffer(&mut self) -> OfflineResult<()> {
            self.writer
                .write_all(&self.buffer)
                .map_err(|e| OfflineError::WriteError(format!("{}: {}", self.path.display(), e)))
        }
    }

    impl SampleSink for Mp3FileSink {
        type Sample = i16;
        type Error = OfflineError;

        fn write(&mut self, samples: &[i16]) -> OfflineResult<()> {
            let frames = samples.len() / CHANNELS as usize;
            self.buffer.clear();
            self.buffer
                .reserve(mp3lame_encoder::max_required_buffer_size(frames));

            let encoded = self
                .encoder
                .encode(InterleavedPcm(samples), self.buffer.spare_capacity_mut())
                .map_err(|e| OfflineError::EncodingError(format!("LAME encode failed: {:?}", e)))?;

            // SAFETY: encoder wrote `encoded` bytes into spare capacity
            unsafe {
                self.buffer.set_len(encoded);
            }
            self.write_buffer()
        }

        fn finish(&mut self) -> OfflineResult<()> {
            if self.finished {
                return Ok(());
            }
            self.finished = true;

            self.buffer.clear();
            self.buffer.reserve(7200);
            let flushed = self
                .encoder
                .flush::<FlushNoGap>(self.buffer.spare_capacity_mut())
                .map_err(|e| OfflineError::EncodingError(format!("LAME flush failed: {:?}", e)))?;

            // SAFETY: encoder wrote `flushed` bytes into spare capacity
            unsafe {
                self.buffer.set_len(flushed);
            }
            self.write_buffer()?;
            finish_output_file(&mut self.writer, &self.path)
        }
    }

}

// ═══════════════════════════════════════════════════════════════════════════════
// OGG ENCODER (Native libvorbis)
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "ogg")]
pub use ogg::OggFileSink;

#[cfg(feature = "ogg")]
mod ogg {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};

    use lb_core::{CHANNELS, SampleSink};
    use vorbis_encoder::Encoder;

    use super::{create_output_file, finish_output_file};
    use crate::config::OggConfig;
    use crate::error::{OfflineError, OfflineResult};
    use crate::project::float_to_i16;

    /// Streaming Ogg Vorbis file writer fed with interleaved stereo f32
    pub struct OggFileSink {
        encoder: Encoder,
        writer: BufWriter<File>,
        pcm: Vec<i16>,
        path: PathBuf,
        finished: bool,
    }

    impl OggFileSink {
        pub fn create(path: &Path, sample_rate: u32, config: &OggConfig) -> OfflineResult<Self> {
            let encoder = Encoder::new(
                CHANNELS as u32,
                sample_rate as u64,
                config.vorbis_quality(),
            )
            .map_err(|e| {
                OfflineError::EncodingError(format!("Vorbis encoder init failed: {}", e))
            })?;

            Ok(Self {
                encoder,
                writer: create_output_file(path)?,
                pcm: Vec::new(),
                path: path.to_path_buf(),
                finished: false,
            })
        }

        fn write_bytes(&mut self, bytes: &[u8]) -> OfflineResult<()> {
            self.writer
                .write_all(bytes)
                .map_err(|e| OfflineError::WriteError(format!("{}: {}", self.path.display(), e)))
        }
    }

    impl SampleSink for OggFileSink {
        type Sample = f32;
        type Error = OfflineError;

        fn write(&mut self, samples: &[f32]) -> OfflineResult<()> {
            // libvorbis bindings take 16-bit input
            self.pcm.clear();
            self.pcm.extend(samples.iter().map(|&s| float_to_i16(s)));

            let data = self
                .encoder
                .encode(&self.pcm)
                .map_err(|e| OfflineError::EncodingError(format!("Vorbis encode failed: {}", e)))?;
            self.write_bytes(&data)
        }

        fn finish(&mut self) -> OfflineResult<()> {
            if self.finished {
                return Ok(());
            }
            self.finished = true;

            let data = self
                .encoder
                .flush()
                .map_err(|e| OfflineError::EncodingError(format!("Vorbis flush failed: {}", e)))?;
            self.write_bytes(&data)?;
            finish_output_file(&mut self.writer, &self.path)
        }
    }
}
