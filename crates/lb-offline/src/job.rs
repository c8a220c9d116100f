//! Render job definitions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OfflineError, OfflineResult};
use crate::formats::{ExportKind, ExportSet, LogFormat};

/// Unique job identifier
pub type JobId = u64;

/// One input file and everything that should be produced from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    /// Unique job ID
    pub id: JobId,

    /// Input log file
    pub input_path: PathBuf,

    /// Directory for artifacts and scratch files
    pub output_dir: PathBuf,

    /// Requested exports
    pub exports: ExportSet,

    /// Peak-normalize before export
    pub normalize: bool,

    /// Parse as this format regardless of extension
    pub format: Option<LogFormat>,

    /// Explicit artifact paths overriding `<output_dir>/<stem>.<ext>`
    pub export_paths: BTreeMap<ExportKind, PathBuf>,

    /// External instrument bank handed to the backend
    #[serde(skip)]
    pub instrument_bank: Option<Vec<u8>>,
}

impl RenderJob {
    /// Create new job builder
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Input file name, used to name the scratch regions
    pub fn file_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("job-{}", self.id))
    }

    /// Input file name without its extension
    pub fn stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("job-{}", self.id))
    }

    /// Where the artifact for `kind` is written; `None` for playback
    pub fn artifact_path(&self, kind: ExportKind) -> Option<PathBuf> {
        if let Some(path) = self.export_paths.get(&kind) {
            return Some(path.clone());
        }
        kind.extension()
            .map(|ext| self.output_dir.join(format!("{}.{}", self.stem(), ext)))
    }

    /// Check the input before any work starts
    pub fn validate(&self) -> OfflineResult<()> {
        if !self.input_path.is_file() {
            return Err(OfflineError::InputNotFound(
                self.input_path.display().to_string(),
            ));
        }
        Ok(())
    }
}

/// Job builder for fluent API
#[derive(Debug)]
pub struct JobBuilder {
    input_path: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    exports: Option<ExportSet>,
    normalize: bool,
    format: Option<LogFormat>,
    export_paths: BTreeMap<ExportKind, PathBuf>,
    instrument_bank: Option<Vec<u8>>,
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self {
            input_path: None,
            output_dir: None,
            exports: None,
            normalize: true,
            format: None,
            export_paths: BTreeMap::new(),
            instrument_bank: None,
        }
    }
}

static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl JobBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set input file
    pub fn input<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.input_path = Some(path.into());
        self
    }

    /// Set output directory (default: the input's directory)
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Replace the export set
    pub fn exports(mut self, exports: ExportSet) -> Self {
        self.exports = Some(exports);
        self
    }

    /// Add one export
    pub fn export(mut self, kind: ExportKind) -> Self {
        self.exports.get_or_insert_with(ExportSet::empty).insert(kind);
        self
    }

    /// Add one export written to an explicit path
    pub fn export_to<P: Into<PathBuf>>(mut self, kind: ExportKind, path: P) -> Self {
        self.export_paths.insert(kind, path.into());
        self.export(kind)
    }

    /// Enable or disable peak normalization (default on)
    pub fn normalize(mut self, enabled: bool) -> Self {
        self.normalize = enabled;
        self
    }

    /// Force the input format
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Instrument bank forwarded to the backend
    pub fn instrument_bank(mut self, bank: Vec<u8>) -> Self {
        self.instrument_bank = Some(bank);
        self
    }

    /// Build the job. With no exports requested, the default set is used.
    pub fn build(self) -> OfflineResult<RenderJob> {
        let input_path = self.input_path.ok_or_else(|| {
            OfflineError::InvalidConfig("Input path is required".to_string())
        })?;

        let output_dir = match self.output_dir {
            Some(dir) => dir,
            None => input_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let id = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        Ok(RenderJob {
            id,
            input_path,
            output_dir,
            exports: self.exports.unwrap_or_else(ExportSet::default_set),
            normalize: self.normalize,
            format: self.format,
            export_paths: self.export_paths,
            instrument_bank: self.instrument_bank,
        })
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Rendering,
    Normalizing,
    Projecting,
    Exporting,
    Cleaning,
    Done,
    Failed,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Pending
    }
}

/// Job completion report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job ID
    pub job_id: JobId,
    /// Input file
    pub input_path: PathBuf,
    /// Final state
    pub state: JobState,
    /// Produced artifacts, in export order
    pub artifacts: Vec<(ExportKind, PathBuf)>,
    /// Exports that failed
    pub failures: Vec<(ExportKind, String)>,
    /// Job-level error (render failure, cancellation)
    pub error: Option<String>,
    /// Normalization gain, if normalization ran
    pub gain: Option<f64>,
    /// Processing duration
    pub elapsed: Duration,
}

impl JobReport {
    pub fn new(job: &RenderJob) -> Self {
        Self {
            job_id: job.id,
            input_path: job.input_path.clone(),
            state: JobState::Pending,
            artifacts: Vec::new(),
            failures: Vec::new(),
            error: None,
            gain: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Done
    }

    /// Path of the artifact produced for `kind`
    pub fn artifact(&self, kind: ExportKind) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, path)| path.as_path())
    }
}
