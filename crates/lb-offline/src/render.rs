//! Render loop
//!
//! Drives a [`SynthSession`] burst by burst into a growable [`PcmBuffer`].
//! Each `Pending(delta)` is followed by exactly `floor(sample_rate * delta)`
//! frames read from the engine, unless the job only wants the MIDI
//! transcript, in which case no frames are read at all. The loop runs on its own thread and posts
//! progress (`offset / total_len`) over a channel at most once per
//! configured interval.

use std::any::Any;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use lb_core::{PcmBuffer, StageProgress};

use crate::engine::{Advance, SynthSession};
use crate::error::{EngineError, OfflineError, OfflineResult};
use crate::interrupt::CancelToken;

/// What a finished render hands to the rest of the job
#[derive(Debug, Default)]
pub struct RenderOutput {
    pub pcm: PcmBuffer,
    pub midi: Option<Vec<u8>>,
}

/// Render loop settings
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub sample_rate: u32,
    pub progress_interval: Duration,
    /// Advance the session without reading audio frames
    pub only_midi: bool,
}

/// Frames to synthesize for a burst of `delta` seconds
#[inline]
pub fn frames_for_delta(sample_rate: u32, delta: f64) -> usize {
    let frames = (sample_rate as f64 * delta).floor();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

/// Run the loop on the calling thread.
///
/// `report` receives raw `offset / total_len` fractions; monotonic filtering
/// and the final 1.0 are up to the caller.
pub fn render_session(
    session: &mut dyn SynthSession,
    total_len: usize,
    settings: RenderSettings,
    cancel: &CancelToken,
    report: &mut dyn FnMut(f64),
) -> OfflineResult<RenderOutput> {
    let mut pcm = PcmBuffer::new(settings.sample_rate);
    let mut last_report = Instant::now();

    loop {
        cancel.check()?;

        match session.advance()? {
            Advance::Finished => break,
            Advance::Pending(_) if settings.only_midi => {}
            Advance::Pending(delta) => {
                for _ in 0..frames_for_delta(settings.sample_rate, delta) {
                    pcm.push_frame(session.read_frame());
                }
            }
        }

        if last_report.elapsed() >= settings.progress_interval {
            last_report = Instant::now();
            if total_len > 0 {
                report(session.offset() as f64 / total_len as f64);
            }
        }
    }

    log::debug!("Rendered {} frames ({:.2}s)", pcm.frames(), pcm.duration());

    Ok(RenderOutput {
        pcm,
        midi: session.take_midi(),
    })
}

/// Run the loop on a dedicated render thread, forwarding monotonic progress
/// to `on_progress` on the calling thread. The last reported value is 1.0.
pub fn render_threaded(
    mut session: Box<dyn SynthSession + Send>,
    total_len: usize,
    settings: RenderSettings,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(f64),
) -> OfflineResult<RenderOutput> {
    let (tx, rx) = unbounded::<f64>();
    let thread_cancel = cancel.clone();

    let handle = thread::Builder::new()
        .name("lb-render".to_string())
        .spawn(move || {
            let mut report = |fraction: f64| {
                let _ = tx.send(fraction);
            };
            render_session(
                session.as_mut(),
                total_len,
                settings,
                &thread_cancel,
                &mut report,
            )
        })
        .map_err(OfflineError::Io)?;

    let mut progress = StageProgress::new();
    // Ends when the render thread drops its sender.
    for fraction in rx.iter() {
        if let Some(value) = progress.advance(fraction) {
            on_progress(value);
        }
    }

    let output = handle
        .join()
        .map_err(|payload| EngineError::Panicked(panic_message(payload.as_ref())))??;

    if let Some(value) = progress.finish() {
        on_progress(value);
    }
    Ok(output)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
