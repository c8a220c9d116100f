//! BatchScheduler Integration Tests
//!
//! Tests for:
//! - Render length and WAV data chunk size (10 s at the engine rate)
//! - Export selection: WAV only, MIDI only, nothing, streaming exports
//! - Output directory creation
//! - Export order and per-export failure isolation
//! - Normalization gain reporting
//! - Fatal errors (missing input, unknown format) stopping the batch
//! - Scratch cleanup after success, failure and interruption

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use lb_core::{Frame, SampleSink};
use lb_offline::{
    Advance, BatchScheduler, CancelToken, EngineError, ExportKind, ExportSet, FloatSink, IntSink,
    JobReport, JobState, LogFormat, OfflineConfig, OfflineError, OfflineResult, PipelineObserver,
    RenderJob, ScratchStore, SessionOptions, SinkProvider, Stage, SynthBackend, SynthSession,
    handle_interrupt,
};
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const RATE: u32 = 49_700;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One input byte per burst; every burst lasts `delta` seconds and renders a
/// square wave of `amplitude`.
struct ToneBackend {
    delta: f64,
    amplitude: i16,
    frames_read: Arc<AtomicUsize>,
    only_midi_requested: Arc<AtomicBool>,
}

impl Default for ToneBackend {
    fn default() -> Self {
        Self {
            delta: 1.0,
            amplitude: 8000,
            frames_read: Arc::new(AtomicUsize::new(0)),
            only_midi_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct ToneSession {
    bursts: usize,
    done: usize,
    delta: f64,
    amplitude: i16,
    flip: bool,
    midi: Option<Vec<u8>>,
    frames_read: Arc<AtomicUsize>,
}

impl SynthSession for ToneSession {
    fn advance(&mut self) -> Result<Advance, EngineError> {
        if self.done == self.bursts {
            return Ok(Advance::Finished);
        }
        self.done += 1;
        Ok(Advance::Pending(self.delta))
    }

    fn read_frame(&mut self) -> Frame {
        self.frames_read.fetch_add(1, Ordering::Relaxed);
        self.flip = !self.flip;
        let value = if self.flip {
            self.amplitude
        } else {
            -self.amplitude
        };
        Frame::new(value, value / 2)
    }

    fn offset(&self) -> usize {
        self.done
    }

    fn take_midi(&mut self) -> Option<Vec<u8>> {
        self.midi.take()
    }
}

impl SynthBackend for ToneBackend {
    fn open(
        &self,
        _format: LogFormat,
        data: &[u8],
        options: &SessionOptions,
    ) -> Result<Box<dyn SynthSession + Send>, EngineError> {
        if data.starts_with(b"BAD") {
            return Err(EngineError::Parse("bad header".to_string()));
        }
        self.only_midi_requested.store(options.only_midi, Ordering::Relaxed);
        Ok(Box::new(ToneSession {
            bursts: data.len(),
            done: 0,
            delta: self.delta,
            amplitude: self.amplitude,
            flip: false,
            midi: options.capture_midi.then(|| b"MThd-test".to_vec()),
            frames_read: Arc::clone(&self.frames_read),
        }))
    }
}

/// What a recording sink saw
#[derive(Debug, Default, Clone)]
struct SinkLog {
    samples: usize,
    finished: bool,
}

type SinkLogs = Rc<RefCell<HashMap<ExportKind, SinkLog>>>;

struct RecordingSink<T> {
    kind: ExportKind,
    logs: SinkLogs,
    fail_on_write: bool,
    interrupt: Option<(CancelToken, &'static ScratchStore)>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: lb_core::ScratchSample> SampleSink for RecordingSink<T> {
    type Sample = T;
    type Error = OfflineError;

    fn write(&mut self, samples: &[T]) -> OfflineResult<()> {
        if let Some((cancel, store)) = &self.interrupt {
            handle_interrupt(cancel, store);
        }
        if self.fail_on_write {
            return Err(OfflineError::EncodingError("encoder crashed".to_string()));
        }
        self.logs.borrow_mut().entry(self.kind).or_default().samples += samples.len();
        Ok(())
    }

    fn finish(&mut self) -> OfflineResult<()> {
        self.logs.borrow_mut().entry(self.kind).or_default().finished = true;
        Ok(())
    }
}

/// Sink provider that records instead of encoding
#[derive(Default)]
struct RecordingSinks {
    logs: SinkLogs,
    fail_open: Vec<ExportKind>,
    fail_write: Vec<ExportKind>,
    interrupt: Option<(CancelToken, &'static ScratchStore)>,
}

impl RecordingSinks {
    fn sink<T>(&self, kind: ExportKind) -> OfflineResult<RecordingSink<T>> {
        if self.fail_open.contains(&kind) {
            return Err(OfflineError::Playback("device unavailable".to_string()));
        }
        Ok(RecordingSink {
            kind,
            logs: Rc::clone(&self.logs),
            fail_on_write: self.fail_write.contains(&kind),
            interrupt: self.interrupt.clone(),
            _marker: std::marker::PhantomData,
        })
    }
}

impl SinkProvider for RecordingSinks {
    fn int_sink(
        &self,
        kind: ExportKind,
        _path: Option<&Path>,
        _sample_rate: u32,
        _config: &OfflineConfig,
    ) -> OfflineResult<IntSink> {
        Ok(Box::new(self.sink::<i16>(kind)?))
    }

    fn float_sink(
        &self,
        kind: ExportKind,
        _path: Option<&Path>,
        _sample_rate: u32,
        _config: &OfflineConfig,
    ) -> OfflineResult<FloatSink> {
        Ok(Box::new(self.sink::<f32>(kind)?))
    }
}

/// Observer that keeps every event
#[derive(Default)]
struct EventLog {
    started: Vec<PathBuf>,
    stages: Vec<Stage>,
    progress: HashMap<Stage, Vec<f64>>,
    gains: Vec<f64>,
    artifacts: Vec<(ExportKind, PathBuf)>,
    failures: Vec<ExportKind>,
    finished: Vec<JobReport>,
}

impl PipelineObserver for EventLog {
    fn job_started(&mut self, job: &RenderJob) {
        self.started.push(job.input_path.clone());
    }

    fn stage_started(&mut self, _job: &RenderJob, stage: Stage) {
        self.stages.push(stage);
    }

    fn progress(&mut self, _job: &RenderJob, stage: Stage, fraction: f64) {
        self.progress.entry(stage).or_default().push(fraction);
    }

    fn gain(&mut self, _job: &RenderJob, gain: f64) {
        self.gains.push(gain);
    }

    fn artifact_written(&mut self, _job: &RenderJob, kind: ExportKind, path: &Path) {
        self.artifacts.push((kind, path.to_path_buf()));
    }

    fn export_failed(&mut self, _job: &RenderJob, kind: ExportKind, _error: &OfflineError) {
        self.failures.push(kind);
    }

    fn job_finished(&mut self, report: &JobReport) {
        self.finished.push(report.clone());
    }
}

/// Input and output directories for one test
struct Workspace {
    _root: TempDir,
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let input_dir = root.path().join("in");
        let output_dir = root.path().join("out");
        fs::create_dir_all(&input_dir).unwrap();
        fs::create_dir_all(&output_dir).unwrap();
        Self {
            _root: root,
            input_dir,
            output_dir,
        }
    }

    /// Input file with `bursts` one-byte commands
    fn input(&self, name: &str, bursts: usize) -> PathBuf {
        let path = self.input_dir.join(name);
        fs::write(&path, vec![0x42u8; bursts]).unwrap();
        path
    }

    fn job(&self, input: &Path, exports: ExportSet) -> RenderJob {
        RenderJob::builder()
            .input(input)
            .output_dir(&self.output_dir)
            .exports(exports)
            .normalize(false)
            .build()
            .unwrap()
    }

    fn output_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.output_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    fn has_scratch(&self) -> bool {
        self.output_files()
            .iter()
            .any(|name| name.ends_with(".tmp") || name.ends_with(".tmp32"))
    }
}

fn assert_monotonic_to_one(values: &[f64]) {
    assert!(!values.is_empty());
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{:?}", values);
    assert_eq!(values.last().copied(), Some(1.0));
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER & WAV
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_ten_second_log_renders_exact_wav() {
    init_logging();
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("E1M1.mus", 10);
    let job = ws.job(&input, ExportSet::empty().with(ExportKind::Wav));

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].state, JobState::Done);
    assert_eq!(ws.output_files(), vec!["E1M1.wav".to_string()]);

    let wav_path = ws.output_dir.join("E1M1.wav");
    let reader = hound::WavReader::open(&wav_path).unwrap();
    assert_eq!(reader.spec().sample_rate, RATE);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.len() as u64 * 2, 4 * 10 * RATE as u64);

    assert_monotonic_to_one(&events.progress[&Stage::Render]);
    assert_eq!(events.artifacts, vec![(ExportKind::Wav, wav_path)]);
}

#[test]
fn test_no_exports_still_renders() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("quiet.dro", 3);
    let job = ws.job(&input, ExportSet::empty());

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    assert_eq!(report.jobs[0].state, JobState::Done);
    assert!(ws.output_files().is_empty());
    assert_monotonic_to_one(&events.progress[&Stage::Render]);
    assert!(report.jobs[0].artifacts.is_empty());
}

#[test]
fn test_explicit_wav_path_creates_parent_dirs() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("song.imf", 1);
    let target = ws.output_dir.join("deep/nested/custom.wav");
    let job = RenderJob::builder()
        .input(&input)
        .output_dir(&ws.output_dir)
        .exports(ExportSet::empty())
        .export_to(ExportKind::Wav, &target)
        .build()
        .unwrap();

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let report = scheduler.run(&[job], &mut EventLog::default()).unwrap();

    assert!(target.exists());
    assert_eq!(report.jobs[0].artifact(ExportKind::Wav), Some(target.as_path()));
}

#[test]
fn test_midi_only_job_skips_audio_synthesis() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("D_E1M1.mus", 5);
    let job = ws.job(&input, ExportSet::empty().with(ExportKind::Midi));

    let backend = ToneBackend::default();
    let frames_read = Arc::clone(&backend.frames_read);
    let only_midi = Arc::clone(&backend.only_midi_requested);
    let scheduler = BatchScheduler::new(backend).with_store(&store);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    assert_eq!(report.jobs[0].state, JobState::Done);
    assert!(only_midi.load(Ordering::Relaxed));
    assert_eq!(frames_read.load(Ordering::Relaxed), 0);
    assert_eq!(ws.output_files(), vec!["D_E1M1.mid".to_string()]);
    assert_monotonic_to_one(&events.progress[&Stage::Render]);
}

#[test]
fn test_midi_with_audio_export_still_synthesizes() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("D_E1M2.mus", 1);
    let exports = ExportSet::empty().with(ExportKind::Midi).with(ExportKind::Wav);
    let job = ws.job(&input, exports);

    let backend = ToneBackend::default();
    let frames_read = Arc::clone(&backend.frames_read);
    let only_midi = Arc::clone(&backend.only_midi_requested);
    let scheduler = BatchScheduler::new(backend).with_store(&store);
    scheduler.run(&[job], &mut EventLog::default()).unwrap();

    assert!(!only_midi.load(Ordering::Relaxed));
    assert_eq!(frames_read.load(Ordering::Relaxed), RATE as usize);
}

#[test]
fn test_missing_output_dir_is_created() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("song.mus", 1);
    let fresh = ws.output_dir.join("fresh");
    let job = RenderJob::builder()
        .input(&input)
        .output_dir(&fresh)
        .exports(ExportSet::empty().with(ExportKind::Wav).with(ExportKind::Mp3))
        .normalize(false)
        .build()
        .unwrap();

    let sinks = RecordingSinks::default();
    let logs = Rc::clone(&sinks.logs);
    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_store(&store)
        .with_sinks(sinks);
    let report = scheduler.run(&[job], &mut EventLog::default()).unwrap();

    assert_eq!(report.jobs[0].state, JobState::Done);
    assert!(fresh.join("song.wav").exists());
    assert!(!fresh.join("song.mus.tmp").exists());
    assert_eq!(logs.borrow()[&ExportKind::Mp3].samples, 2 * RATE as usize);
}

// ═══════════════════════════════════════════════════════════════════════════════
// NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_half_peak_input_reports_gain_two() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("half.raw", 1);
    let job = RenderJob::builder()
        .input(&input)
        .output_dir(&ws.output_dir)
        .exports(ExportSet::empty().with(ExportKind::Wav))
        .build()
        .unwrap();

    let backend = ToneBackend {
        delta: 0.1,
        amplitude: 16383,
        ..Default::default()
    };
    let config = OfflineConfig::default().with_target_peak(32766);
    let scheduler = BatchScheduler::new(backend)
        .with_config(config)
        .with_store(&store);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    assert_eq!(events.gains, vec![2.0]);
    assert_eq!(report.jobs[0].gain, Some(2.0));
    assert_monotonic_to_one(&events.progress[&Stage::Normalize]);

    let mut reader = hound::WavReader::open(ws.output_dir.join("half.wav")).unwrap();
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(&samples[..4], &[32766, 16382, -32766, -16382]);
}

#[test]
fn test_gain_not_reported_without_normalization() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("raw.raw", 1);
    let job = ws.job(&input, ExportSet::empty().with(ExportKind::Wav));

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let mut events = EventLog::default();
    scheduler.run(&[job], &mut events).unwrap();

    assert!(events.gains.is_empty());
    assert!(!events.stages.contains(&Stage::Normalize));
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAMING EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_streaming_exports_run_in_order_and_see_every_sample() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("E1M2.mus", 2);
    let exports = ExportSet::empty()
        .with(ExportKind::Play)
        .with(ExportKind::Ogg)
        .with(ExportKind::Mp3)
        .with(ExportKind::Wav)
        .with(ExportKind::Midi);
    let job = ws.job(&input, exports);

    let sinks = RecordingSinks::default();
    let logs = Rc::clone(&sinks.logs);
    let config = OfflineConfig::default().with_io_chunk_bytes(1000);
    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_config(config)
        .with_store(&store)
        .with_sinks(sinks);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    assert_eq!(report.jobs[0].state, JobState::Done);
    assert_eq!(
        events.stages,
        vec![
            Stage::Render,
            Stage::Export(ExportKind::Midi),
            Stage::Export(ExportKind::Wav),
            Stage::Export(ExportKind::Mp3),
            Stage::Export(ExportKind::Ogg),
            Stage::Export(ExportKind::Play),
        ]
    );

    let expected_samples = 2 * 2 * RATE as usize;
    let logs = logs.borrow();
    for kind in [ExportKind::Mp3, ExportKind::Ogg, ExportKind::Play] {
        assert_eq!(logs[&kind].samples, expected_samples, "{}", kind);
        assert!(logs[&kind].finished, "{}", kind);
        assert_monotonic_to_one(&events.progress[&Stage::Export(kind)]);
    }

    assert_eq!(
        fs::read(ws.output_dir.join("E1M2.mid")).unwrap(),
        b"MThd-test".to_vec()
    );
    assert!(!ws.has_scratch());
    assert!(store.live_jobs().is_empty());
}

#[test]
fn test_failed_export_does_not_stop_remaining_exports() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("broken.laa", 1);
    let exports = ExportSet::empty()
        .with(ExportKind::Wav)
        .with(ExportKind::Mp3)
        .with(ExportKind::Ogg)
        .with(ExportKind::Play);
    let job = ws.job(&input, exports);

    let sinks = RecordingSinks {
        fail_open: vec![ExportKind::Play],
        fail_write: vec![ExportKind::Mp3],
        ..Default::default()
    };
    let logs = Rc::clone(&sinks.logs);
    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_store(&store)
        .with_sinks(sinks);
    let mut events = EventLog::default();
    let report = scheduler.run(&[job], &mut events).unwrap();

    let job_report = &report.jobs[0];
    assert_eq!(job_report.state, JobState::Failed);
    assert!(job_report.error.is_none());
    assert_eq!(
        job_report
            .failures
            .iter()
            .map(|(kind, _)| *kind)
            .collect::<Vec<_>>(),
        vec![ExportKind::Mp3, ExportKind::Play]
    );
    assert_eq!(events.failures, vec![ExportKind::Mp3, ExportKind::Play]);

    assert!(job_report.artifact(ExportKind::Wav).is_some());
    assert!(job_report.artifact(ExportKind::Ogg).is_some());
    assert!(logs.borrow()[&ExportKind::Ogg].finished);
    assert!(!ws.has_scratch());
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURES & CLEANUP
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_missing_input_aborts_batch() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let missing = ws.input_dir.join("nope.mus");
    let good = ws.input("good.mus", 1);
    let jobs = vec![
        ws.job(&missing, ExportSet::empty().with(ExportKind::Wav)),
        ws.job(&good, ExportSet::empty().with(ExportKind::Wav)),
    ];

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let mut events = EventLog::default();
    let result = scheduler.run(&jobs, &mut events);

    assert!(matches!(result, Err(OfflineError::InputNotFound(_))));
    assert_eq!(events.started.len(), 1);
    assert_eq!(events.finished[0].state, JobState::Failed);
    assert!(ws.output_files().is_empty());
}

#[test]
fn test_unknown_format_aborts_batch() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("mystery.xyz", 1);
    let job = ws.job(&input, ExportSet::empty().with(ExportKind::Mp3));

    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_store(&store)
        .with_sinks(RecordingSinks::default());
    let result = scheduler.run(&[job], &mut EventLog::default());

    assert!(matches!(result, Err(OfflineError::UnknownFormat(_))));
    assert!(!ws.has_scratch());
}

#[test]
fn test_format_override_accepts_any_extension() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("capture.bin", 1);
    let job = RenderJob::builder()
        .input(&input)
        .output_dir(&ws.output_dir)
        .exports(ExportSet::empty().with(ExportKind::Wav))
        .format(LogFormat::Raw)
        .build()
        .unwrap();

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let report = scheduler.run(&[job], &mut EventLog::default()).unwrap();
    assert_eq!(report.jobs[0].state, JobState::Done);
    assert!(ws.output_dir.join("capture.wav").exists());
}

#[test]
fn test_engine_failure_is_job_local() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let bad = ws.input_dir.join("bad.mus");
    fs::write(&bad, b"BAD header").unwrap();
    let good = ws.input("good.mus", 1);
    let jobs = vec![
        ws.job(&bad, ExportSet::empty().with(ExportKind::Wav)),
        ws.job(&good, ExportSet::empty().with(ExportKind::Wav)),
    ];

    let scheduler = BatchScheduler::new(ToneBackend::default()).with_store(&store);
    let report = scheduler.run(&jobs, &mut EventLog::default()).unwrap();

    assert_eq!(report.jobs[0].state, JobState::Failed);
    assert!(report.jobs[0].error.as_deref().unwrap().contains("bad header"));
    assert_eq!(report.jobs[1].state, JobState::Done);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(ws.output_files(), vec!["good.wav".to_string()]);
}

#[test]
fn test_cancelled_batch_runs_nothing() {
    let ws = Workspace::new();
    let store = ScratchStore::new();
    let input = ws.input("a.mus", 1);
    let job = ws.job(&input, ExportSet::empty().with(ExportKind::Wav));

    let cancel = CancelToken::new();
    cancel.cancel();
    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_store(&store)
        .with_cancel_token(cancel);
    let mut events = EventLog::default();

    assert!(matches!(
        scheduler.run(&[job], &mut events),
        Err(OfflineError::Cancelled)
    ));
    assert!(events.started.is_empty());
}

#[test]
fn test_interrupt_mid_export_removes_scratch() {
    let ws = Workspace::new();
    let store: &'static ScratchStore = Box::leak(Box::new(ScratchStore::new()));
    let input = ws.input("long.mus", 2);
    let exports = ExportSet::empty()
        .with(ExportKind::Mp3)
        .with(ExportKind::Ogg);
    let job = ws.job(&input, exports);

    let cancel = CancelToken::new();
    let sinks = RecordingSinks {
        interrupt: Some((cancel.clone(), store)),
        ..Default::default()
    };
    let config = OfflineConfig::default().with_io_chunk_bytes(4096);
    let scheduler = BatchScheduler::new(ToneBackend::default())
        .with_config(config)
        .with_store(store)
        .with_sinks(sinks)
        .with_cancel_token(cancel.clone());

    let result = scheduler.run(&[job], &mut EventLog::default());

    assert!(matches!(result, Err(OfflineError::Cancelled)));
    assert!(cancel.is_cancelled());
    assert!(!ws.has_scratch());
    assert!(store.live_jobs().is_empty());
}
