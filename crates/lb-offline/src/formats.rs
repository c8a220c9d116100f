//! Input log formats and export targets

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OfflineError, OfflineResult};

// ═══════════════════════════════════════════════════════════════════════════════
// INPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Register-log container the backend should parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Laa,
    Mus,
    Dro,
    Imf,
    Raw,
}

impl LogFormat {
    pub const ALL: [LogFormat; 5] = [Self::Laa, Self::Mus, Self::Dro, Self::Imf, Self::Raw];

    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Laa => "laa",
            Self::Mus => "mus",
            Self::Dro => "dro",
            Self::Imf => "imf",
            Self::Raw => "raw",
        }
    }

    /// Match a file extension, ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }

    /// Resolve the format of `path`: explicit override first, then extension
    pub fn detect(path: &Path, override_format: Option<LogFormat>) -> OfflineResult<Self> {
        if let Some(format) = override_format {
            return Ok(format);
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| OfflineError::UnknownFormat(path.display().to_string()))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for LogFormat {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| OfflineError::UnknownFormat(s.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT TARGETS
// ═══════════════════════════════════════════════════════════════════════════════

/// One export a job can produce.
///
/// Declaration order is execution order within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Midi,
    Wav,
    Mp3,
    Ogg,
    Play,
}

impl ExportKind {
    pub const ALL: [ExportKind; 5] = [Self::Midi, Self::Wav, Self::Mp3, Self::Ogg, Self::Play];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Midi => "midi",
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Play => "play",
        }
    }

    /// Artifact file extension; playback produces no file
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Midi => Some("mid"),
            Self::Wav => Some("wav"),
            Self::Mp3 => Some("mp3"),
            Self::Ogg => Some("ogg"),
            Self::Play => None,
        }
    }

    /// Whether this build was compiled with support for the export
    pub fn is_available(&self) -> bool {
        match self {
            Self::Midi | Self::Wav => true,
            Self::Mp3 => cfg!(feature = "mp3"),
            Self::Ogg => cfg!(feature = "ogg"),
            Self::Play => cfg!(feature = "playback"),
        }
    }

    /// Streams the integer scratch region
    pub fn reads_int_scratch(&self) -> bool {
        matches!(self, Self::Mp3 | Self::Play)
    }

    /// Streams the float scratch region
    pub fn reads_float_scratch(&self) -> bool {
        matches!(self, Self::Ogg)
    }

    /// Consumes rendered audio (everything except the MIDI transcript)
    pub fn needs_audio(&self) -> bool {
        !matches!(self, Self::Midi)
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportKind {
    type Err = OfflineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower || kind.extension() == Some(lower.as_str()))
            .ok_or_else(|| OfflineError::InvalidConfig(format!("Unknown export: {s}")))
    }
}

/// Ordered set of exports for a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSet {
    kinds: BTreeSet<ExportKind>,
}

impl ExportSet {
    /// No exports
    pub fn empty() -> Self {
        Self::default()
    }

    /// WAV, MP3, Ogg and MIDI, restricted to what this build supports
    pub fn default_set() -> Self {
        [ExportKind::Wav, ExportKind::Mp3, ExportKind::Ogg, ExportKind::Midi]
            .into_iter()
            .filter(ExportKind::is_available)
            .collect()
    }

    pub fn with(mut self, kind: ExportKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn insert(&mut self, kind: ExportKind) -> bool {
        self.kinds.insert(kind)
    }

    pub fn contains(&self, kind: ExportKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Exports in execution order
    pub fn iter(&self) -> impl Iterator<Item = ExportKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Any export needs rendered PCM
    pub fn needs_audio(&self) -> bool {
        self.iter().any(|kind| kind.needs_audio())
    }

    pub fn needs_int_scratch(&self) -> bool {
        self.iter().any(|kind| kind.reads_int_scratch())
    }

    pub fn needs_float(&self) -> bool {
        self.iter().any(|kind| kind.reads_float_scratch())
    }
}

impl FromIterator<ExportKind> for ExportSet {
    fn from_iter<I: IntoIterator<Item = ExportKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}
