//! Configuration types for rendering and export

use std::time::Duration;

use lb_core::NATIVE_SAMPLE_RATE;
use serde::{Deserialize, Serialize};

use crate::error::{OfflineError, OfflineResult};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Engine output rate (Hz)
    pub sample_rate: u32,

    /// Minimum wall-clock time between render progress reports (ms)
    pub progress_interval_ms: u64,

    /// Samples processed between normalizer progress reports
    pub block_size: usize,

    /// Bytes read from scratch storage per export chunk
    pub io_chunk_bytes: usize,

    /// Peak normalization
    pub normalize: NormalizeConfig,

    /// MP3 encoder settings
    pub mp3: Mp3Config,

    /// Ogg Vorbis encoder settings
    pub ogg: OggConfig,

    /// Live playback settings
    pub playback: PlaybackConfig,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            sample_rate: NATIVE_SAMPLE_RATE,
            progress_interval_ms: 100,
            block_size: 65536,
            io_chunk_bytes: 64 * 1024,
            normalize: NormalizeConfig::default(),
            mp3: Mp3Config::default(),
            ogg: OggConfig::default(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl OfflineConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> OfflineResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| OfflineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> OfflineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| OfflineError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> OfflineResult<()> {
        if self.sample_rate == 0 {
            return Err(OfflineError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        if self.block_size == 0 || self.io_chunk_bytes == 0 {
            return Err(OfflineError::InvalidConfig(
                "block_size and io_chunk_bytes must be positive".to_string(),
            ));
        }
        if !(1..=i16::MAX as i32).contains(&self.normalize.target_peak) {
            return Err(OfflineError::InvalidConfig(format!(
                "target_peak {} outside 1..=32767",
                self.normalize.target_peak
            )));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Set engine sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Set render progress interval
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set normalizer block size
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size.max(1);
        self
    }

    /// Set export read chunk size
    pub fn with_io_chunk_bytes(mut self, bytes: usize) -> Self {
        self.io_chunk_bytes = bytes.max(1);
        self
    }

    /// Set normalization target peak
    pub fn with_target_peak(mut self, peak: i32) -> Self {
        self.normalize.target_peak = peak;
        self
    }

    /// Set MP3 bitrate
    pub fn with_mp3_bitrate(mut self, kbps: u16) -> Self {
        self.mp3.bitrate_kbps = kbps;
        self
    }

    /// Set Ogg quality
    pub fn with_ogg_quality(mut self, quality: f32) -> Self {
        self.ogg.quality = quality;
        self
    }
}

/// Peak normalization settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Absolute sample value the loudest sample is scaled to
    pub target_peak: i32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_peak: i16::MAX as i32,
        }
    }
}

/// MP3 configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mp3Config {
    /// Constant bitrate (kbps)
    pub bitrate_kbps: u16,
}

impl Default for Mp3Config {
    fn default() -> Self {
        Self { bitrate_kbps: 128 }
    }
}

/// OGG Vorbis configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OggConfig {
    /// Quality (-1 to 10, higher = better)
    pub quality: f32,
}

impl Default for OggConfig {
    fn default() -> Self {
        Self { quality: 4.0 }
    }
}

impl OggConfig {
    /// Map quality (-1 to 10) to libvorbis quality (-0.1 to 1.0)
    pub fn vorbis_quality(&self) -> f32 {
        let clamped = self.quality.clamp(-1.0, 10.0);
        (clamped + 1.0) / 11.0 * 1.1 - 0.1
    }
}

/// Live playback configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output device name (None = system default)
    pub device: Option<String>,
    /// Ring buffer capacity in device frames
    pub ring_frames: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            ring_frames: 16384,
        }
    }
}
