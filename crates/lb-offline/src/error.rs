//! Error types for the render-and-export pipeline

use thiserror::Error;

/// Failure reported by a synthesis backend or session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Failed to parse command stream: {0}")]
    Parse(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Render thread panicked: {0}")]
    Panicked(String),
}

/// Pipeline errors
#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Failed to read input file: {0}")]
    ReadError(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Failed to write output file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Scratch storage error: {0}")]
    Scratch(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Export not available in this build: {0}")]
    ExportUnavailable(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl OfflineError {
    /// Errors that stop the whole batch, not just the current job
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound(_) | Self::ReadError(_) | Self::UnknownFormat(_)
        )
    }
}

#[cfg(feature = "playback")]
impl From<lb_audio::AudioError> for OfflineError {
    fn from(err: lb_audio::AudioError) -> Self {
        Self::Playback(err.to_string())
    }
}

/// Result type for pipeline operations
pub type OfflineResult<T> = Result<T, OfflineError>;
