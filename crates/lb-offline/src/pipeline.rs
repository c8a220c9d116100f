//! Batch scheduler
//!
//! Runs render jobs strictly one after another. Per job:
//! 1. Read the input and detect its format
//! 2. Render on a dedicated thread
//! 3. Normalize (optional)
//! 4. Write the scratch regions the requested exports need
//! 5. Run the exports in order: MIDI, WAV, MP3, Ogg, playback
//! 6. Remove the scratch regions, whatever happened before

use std::fmt;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lb_core::PcmBuffer;
use serde::{Deserialize, Serialize};

use crate::config::OfflineConfig;
use crate::encoder::{write_midi, write_wav};
use crate::engine::{SessionOptions, SynthBackend};
use crate::error::{OfflineError, OfflineResult};
use crate::export::{NativeSinks, SinkProvider, stream_region};
use crate::formats::{ExportKind, LogFormat};
use crate::interrupt::{
    CancelToken, INTERRUPT_EXIT_CODE, spawn_interrupt_thread, wait_for_interrupt,
};
use crate::job::{JobId, JobReport, JobState, RenderJob};
use crate::normalize::Normalizer;
use crate::project::project_to_float;
use crate::render::{RenderOutput, RenderSettings, render_threaded};
use crate::scratch::{ScratchKind, ScratchStore};

// ═══════════════════════════════════════════════════════════════════════════════
// STAGES & OBSERVER
// ═══════════════════════════════════════════════════════════════════════════════

/// Job stage that reports progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Render,
    Normalize,
    Export(ExportKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render => f.write_str("Processing"),
            Self::Normalize => f.write_str("Normalizing"),
            Self::Export(ExportKind::Play) => f.write_str("Playing"),
            Self::Export(kind) => write!(f, "Exporting {}", kind),
        }
    }
}

/// Receives pipeline events. All methods default to no-ops.
pub trait PipelineObserver {
    fn job_started(&mut self, _job: &RenderJob) {}

    fn stage_started(&mut self, _job: &RenderJob, _stage: Stage) {}

    /// Monotonic within a stage; the last value of a completed stage is 1.0
    fn progress(&mut self, _job: &RenderJob, _stage: Stage, _fraction: f64) {}

    /// Emitted once per job, only when normalization ran
    fn gain(&mut self, _job: &RenderJob, _gain: f64) {}

    fn artifact_written(&mut self, _job: &RenderJob, _kind: ExportKind, _path: &Path) {}

    fn export_failed(&mut self, _job: &RenderJob, _kind: ExportKind, _error: &OfflineError) {}

    fn job_finished(&mut self, _report: &JobReport) {}
}

/// Observer that ignores every event
#[derive(Debug, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {}

/// Observer that reports through the `log` facade, progress in 10 % steps
#[derive(Debug, Default)]
pub struct LogObserver {
    last_step: Option<(JobId, Stage, u32)>,
}

impl LogObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineObserver for LogObserver {
    fn job_started(&mut self, job: &RenderJob) {
        self.last_step = None;
        log::info!("Processing {}", job.input_path.display());
    }

    fn progress(&mut self, job: &RenderJob, stage: Stage, fraction: f64) {
        let step = (fraction * 10.0).floor() as u32;
        if let Some((id, last_stage, last)) = self.last_step
            && id == job.id
            && last_stage == stage
            && step <= last
        {
            return;
        }
        self.last_step = Some((job.id, stage, step));
        log::info!(
            "{} {} {:>3}%",
            stage,
            job.input_path.display(),
            step * 10
        );
    }

    fn gain(&mut self, _job: &RenderJob, gain: f64) {
        log::info!("Normalization gain x{:.2}", gain);
    }

    fn artifact_written(&mut self, _job: &RenderJob, kind: ExportKind, path: &Path) {
        log::info!("{} exported to {}", kind.name().to_uppercase(), path.display());
    }

    fn export_failed(&mut self, job: &RenderJob, kind: ExportKind, error: &OfflineError) {
        match job.artifact_path(kind) {
            Some(path) => log::error!("Failed to export {}: {}", path.display(), error),
            None => log::error!("Failed to play {}: {}", job.input_path.display(), error),
        }
    }

    fn job_finished(&mut self, report: &JobReport) {
        if let Some(error) = &report.error {
            log::error!("{} failed: {}", report.input_path.display(), error);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BATCH REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<JobReport>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    /// Every artifact produced by the batch
    pub fn artifacts(&self) -> impl Iterator<Item = (ExportKind, &Path)> + '_ {
        self.jobs
            .iter()
            .flat_map(|r| r.artifacts.iter().map(|(kind, path)| (*kind, path.as_path())))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

/// Sequential render-and-export scheduler
pub struct BatchScheduler<'a, B: SynthBackend> {
    backend: B,
    config: OfflineConfig,
    store: &'a ScratchStore,
    sinks: Box<dyn SinkProvider + 'a>,
    cancel: CancelToken,
}

impl<B: SynthBackend> BatchScheduler<'static, B> {
    /// Scheduler using the global scratch store and the native sinks
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: OfflineConfig::default(),
            store: ScratchStore::global(),
            sinks: Box::new(NativeSinks),
            cancel: CancelToken::new(),
        }
    }

    /// Install the Ctrl-C handler bound to this scheduler's cancel token.
    /// The handler purges this scheduler's scratch store.
    pub fn install_interrupt_handler(&self) -> OfflineResult<JoinHandle<()>> {
        self.spawn_interrupt_handler(wait_for_interrupt(), |_| {
            std::process::exit(INTERRUPT_EXIT_CODE)
        })
    }

    fn spawn_interrupt_handler<F, H>(
        &self,
        trigger: F,
        on_handled: H,
    ) -> OfflineResult<JoinHandle<()>>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
        H: FnOnce(usize) + Send + 'static,
    {
        spawn_interrupt_thread(self.cancel.clone(), self.store, trigger, on_handled)
    }
}

impl<'a, B: SynthBackend> BatchScheduler<'a, B> {
    /// Set pipeline configuration
    pub fn with_config(mut self, config: OfflineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a different scratch store
    pub fn with_store<'b>(self, store: &'b ScratchStore) -> BatchScheduler<'b, B>
    where
        'a: 'b,
    {
        BatchScheduler {
            backend: self.backend,
            config: self.config,
            store,
            sinks: self.sinks,
            cancel: self.cancel,
        }
    }

    /// Use different encoders/devices for streaming exports
    pub fn with_sinks(mut self, sinks: impl SinkProvider + 'a) -> Self {
        self.sinks = Box::new(sinks);
        self
    }

    /// Share an existing cancel token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run `jobs` in order. Stops at the first fatal error or cancellation.
    pub fn run(
        &self,
        jobs: &[RenderJob],
        observer: &mut dyn PipelineObserver,
    ) -> OfflineResult<BatchReport> {
        self.config.validate()?;
        let start = Instant::now();
        let mut reports = Vec::with_capacity(jobs.len());

        for job in jobs {
            self.cancel.check()?;
            reports.push(self.run_job(job, observer)?);
        }

        let report = BatchReport {
            jobs: reports,
            elapsed: start.elapsed(),
        };
        log::info!(
            "Finished in {:.2?} ({} succeeded, {} failed)",
            report.elapsed,
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }

    /// Run one job through every stage, then clean its scratch regions.
    ///
    /// Job-local failures are recorded in the report; only fatal errors and
    /// cancellation are returned as `Err`.
    pub fn run_job(
        &self,
        job: &RenderJob,
        observer: &mut dyn PipelineObserver,
    ) -> OfflineResult<JobReport> {
        let start = Instant::now();
        let mut report = JobReport::new(job);
        observer.job_started(job);

        self.store.open_namespace(job.id, &job.output_dir, &job.file_name());
        let outcome = self.execute(job, &mut report, observer);

        report.state = JobState::Cleaning;
        if let Err(e) = self.store.discard_job(job.id) {
            log::warn!("Job {}: scratch cleanup incomplete: {}", job.id, e);
        }
        report.elapsed = start.elapsed();

        let abort = match outcome {
            Ok(()) if report.failures.is_empty() => {
                report.state = JobState::Done;
                None
            }
            Ok(()) => {
                report.state = JobState::Failed;
                None
            }
            Err(e) => {
                report.state = JobState::Failed;
                report.error = Some(e.to_string());
                if e.is_fatal() || matches!(e, OfflineError::Cancelled) {
                    Some(e)
                } else {
                    None
                }
            }
        };

        observer.job_finished(&report);
        match abort {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn execute(
        &self,
        job: &RenderJob,
        report: &mut JobReport,
        observer: &mut dyn PipelineObserver,
    ) -> OfflineResult<()> {
        job.validate()?;
        let data = fs::read(&job.input_path).map_err(|e| {
            OfflineError::ReadError(format!("{}: {}", job.input_path.display(), e))
        })?;
        let format = LogFormat::detect(&job.input_path, job.format)?;
        fs::create_dir_all(&job.output_dir).map_err(|e| {
            OfflineError::WriteError(format!("{}: {}", job.output_dir.display(), e))
        })?;

        // Render
        report.state = JobState::Rendering;
        observer.stage_started(job, Stage::Render);
        let capture_midi = job.exports.contains(ExportKind::Midi);
        let only_midi = capture_midi && !job.exports.needs_audio();
        let options = SessionOptions {
            capture_midi,
            only_midi,
            instrument_bank: job.instrument_bank.clone(),
        };
        let session = self.backend.open(format, &data, &options)?;
        let total_len = data.len();
        drop(data);

        let settings = RenderSettings {
            sample_rate: self.config.sample_rate,
            progress_interval: self.config.progress_interval(),
            only_midi,
        };
        let RenderOutput { mut pcm, midi } = render_threaded(
            session,
            total_len,
            settings,
            &self.cancel,
            &mut |f| observer.progress(job, Stage::Render, f),
        )?;
        log::debug!(
            "Job {}: {} frames, {} bytes of PCM",
            job.id,
            pcm.frames(),
            pcm.byte_len()
        );

        // Normalize
        if job.normalize {
            report.state = JobState::Normalizing;
            observer.stage_started(job, Stage::Normalize);
            let normalizer = Normalizer::new(&self.config.normalize, self.config.block_size);
            let result = normalizer.normalize(&mut pcm, &self.cancel, &mut |f| {
                observer.progress(job, Stage::Normalize, f)
            })?;
            report.gain = Some(result.gain);
            observer.gain(job, result.gain);
        }

        // Scratch regions
        if job.exports.needs_int_scratch() {
            self.store.put(job.id, ScratchKind::Int, pcm.samples())?;
        }
        if job.exports.needs_float() {
            report.state = JobState::Projecting;
            let float = project_to_float(&pcm);
            self.store.put(job.id, ScratchKind::Float, float.samples())?;
        }

        // Exports
        report.state = JobState::Exporting;
        for kind in job.exports.iter() {
            self.cancel.check()?;
            observer.stage_started(job, Stage::Export(kind));

            match self.export(job, kind, &pcm, midi.as_deref(), observer) {
                Ok(Some(path)) => {
                    observer.artifact_written(job, kind, &path);
                    report.artifacts.push((kind, path));
                }
                Ok(None) => {}
                Err(OfflineError::Cancelled) => return Err(OfflineError::Cancelled),
                Err(e) => {
                    log::warn!("Job {}: {} export failed: {}", job.id, kind, e);
                    observer.export_failed(job, kind, &e);
                    report.failures.push((kind, e.to_string()));
                }
            }
        }

        Ok(())
    }

    /// Run one export. Returns the artifact path, if a file was produced.
    fn export(
        &self,
        job: &RenderJob,
        kind: ExportKind,
        pcm: &PcmBuffer,
        midi: Option<&[u8]>,
        observer: &mut dyn PipelineObserver,
    ) -> OfflineResult<Option<PathBuf>> {
        let path = job.artifact_path(kind);
        let mut on_progress = |f: f64| observer.progress(job, Stage::Export(kind), f);

        match kind {
            ExportKind::Midi => {
                let Some(midi) = midi else {
                    log::warn!("No MIDI transcript for {}", job.input_path.display());
                    return Ok(None);
                };
                let path = required(kind, path)?;
                write_midi(&path, midi)?;
                on_progress(1.0);
                Ok(Some(path))
            }
            ExportKind::Wav => {
                let path = required(kind, path)?;
                write_wav(&path, pcm)?;
                on_progress(1.0);
                Ok(Some(path))
            }
            ExportKind::Mp3 | ExportKind::Play => {
                let mut sink =
                    self.sinks.int_sink(kind, path.as_deref(), pcm.sample_rate(), &self.config)?;
                stream_region(
                    self.store,
                    job.id,
                    ScratchKind::Int,
                    &self.config,
                    &mut sink,
                    &self.cancel,
                    &mut on_progress,
                )?;
                Ok(path)
            }
            ExportKind::Ogg => {
                let mut sink =
                    self.sinks.float_sink(kind, path.as_deref(), pcm.sample_rate(), &self.config)?;
                stream_region(
                    self.store,
                    job.id,
                    ScratchKind::Float,
                    &self.config,
                    &mut sink,
                    &self.cancel,
                    &mut on_progress,
                )?;
                Ok(path)
            }
        }
    }
}

fn required(kind: ExportKind, path: Option<PathBuf>) -> OfflineResult<PathBuf> {
    path.ok_or_else(|| OfflineError::InvalidConfig(format!("No output path for {}", kind)))
}
