//! Live playback sink
//!
//! Frames written to [`PlaybackSink`] are converted to float, resampled to the
//! device rate and committed to an `rtrb` ring in whole frames. The cpal
//! callback drains the ring; when the ring is full `write` sleeps, which
//! throttles the export pump reading the scratch region.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample, Stream, StreamConfig};
use lb_core::{I16_SCALE, NATIVE_SAMPLE_RATE, SampleSink};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{AudioError, AudioResult, LinearResampler, StereoF32, select_output_device};

// ═══════════════════════════════════════════════════════════════════════════════
// OPTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Playback sink options
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Output device name; `None` uses the host default
    pub device_name: Option<String>,
    /// Rate of the incoming PCM
    pub source_rate: u32,
    /// Ring capacity in device frames
    pub ring_frames: usize,
    /// Sleep between retries while the ring is full or draining
    pub poll_interval: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            device_name: None,
            source_rate: NATIVE_SAMPLE_RATE,
            ring_frames: 16384,
            poll_interval: Duration::from_millis(5),
        }
    }
}

impl PlaybackOptions {
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub fn with_ring_frames(mut self, frames: usize) -> Self {
        self.ring_frames = frames.max(64);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAYBACK SINK
// ═══════════════════════════════════════════════════════════════════════════════

/// Sink that plays interleaved stereo i16 samples on an output device
pub struct PlaybackSink {
    stream: Stream,
    producer: Producer<f32>,
    resampler: LinearResampler,
    failure: Arc<Mutex<Option<String>>>,
    poll_interval: Duration,
    device_rate: u32,
    /// Frames waiting for ring space
    pending: Vec<StereoF32>,
    staging: Vec<StereoF32>,
    /// Half of a frame left over from the previous write
    carry: Option<i16>,
    finished: bool,
}

impl PlaybackSink {
    /// Open the device and start the output stream
    pub fn open(options: &PlaybackOptions) -> AudioResult<Self> {
        let device = select_output_device(options.device_name.as_deref())?;
        let supported = device
            .default_output_config()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let device_rate = config.sample_rate.0;

        let (producer, consumer) = RingBuffer::<f32>::new(options.ring_frames.max(64) * 2);
        let failure = Arc::new(Mutex::new(None));

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, &failure)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, &failure)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, &failure)?,
            other => {
                return Err(AudioError::ConfigError(format!(
                    "Unsupported sample format: {other:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        log::info!(
            "Playback started: {} Hz source -> {} Hz device, {} channels",
            options.source_rate,
            device_rate,
            config.channels
        );

        Ok(Self {
            stream,
            producer,
            resampler: LinearResampler::new(options.source_rate, device_rate),
            failure,
            poll_interval: options.poll_interval,
            device_rate,
            pending: Vec::new(),
            staging: Vec::new(),
            carry: None,
            finished: false,
        })
    }

    /// Device sample rate the stream runs at
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    fn check_failure(&self) -> AudioResult<()> {
        match self.failure.lock().take() {
            Some(err) => Err(AudioError::StreamError(err)),
            None => Ok(()),
        }
    }

    /// Commit `pending` to the ring, sleeping while it is full
    fn drain_pending(&mut self) -> AudioResult<()> {
        let mut written = 0;
        while written < self.pending.len() {
            let free_frames = self.producer.slots() / 2;
            let n = free_frames.min(self.pending.len() - written);
            if n == 0 {
                self.check_failure()?;
                thread::sleep(self.poll_interval);
                continue;
            }

            let mut chunk = self
                .producer
                .write_chunk(n * 2)
                .map_err(|e| AudioError::StreamError(e.to_string()))?;
            let (first, second) = chunk.as_mut_slices();
            let mut samples = self.pending[written..written + n]
                .iter()
                .flat_map(|frame| [frame[0], frame[1]]);
            for slot in first.iter_mut().chain(second.iter_mut()) {
                *slot = samples.next().unwrap_or(0.0);
            }
            chunk.commit_all();
            written += n;
        }
        self.pending.clear();
        Ok(())
    }

    /// Block until the device has consumed everything in the ring
    fn wait_drained(&self) -> AudioResult<()> {
        let capacity = self.producer.buffer().capacity();
        while self.producer.slots() < capacity {
            self.check_failure()?;
            thread::sleep(self.poll_interval);
        }
        // Let the last device period play out.
        let settle = Instant::now();
        while settle.elapsed() < Duration::from_millis(50) {
            thread::sleep(self.poll_interval);
        }
        self.check_failure()
    }
}

impl SampleSink for PlaybackSink {
    type Sample = i16;
    type Error = AudioError;

    fn write(&mut self, samples: &[i16]) -> AudioResult<()> {
        self.check_failure()?;

        self.staging.clear();
        let mut rest = samples;
        if let Some(left) = self.carry.take() {
            match rest.split_first() {
                Some((&right, tail)) => {
                    self.staging.push([to_f32(left), to_f32(right)]);
                    rest = tail;
                }
                None => {
                    self.carry = Some(left);
                    return Ok(());
                }
            }
        }

        let mut frames = rest.chunks_exact(2);
        self.staging
            .extend(frames.by_ref().map(|pair| [to_f32(pair[0]), to_f32(pair[1])]));
        if let [odd] = frames.remainder() {
            self.carry = Some(*odd);
        }

        self.resampler.process(&self.staging, &mut self.pending);
        self.drain_pending()
    }

    fn finish(&mut self) -> AudioResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.resampler.flush(&mut self.pending);
        self.drain_pending()?;
        self.wait_drained()?;

        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause playback stream: {}", e);
        }
        log::info!("Playback finished");
        Ok(())
    }
}

#[inline]
fn to_f32(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

// ═══════════════════════════════════════════════════════════════════════════════
// STREAM SETUP
// ═══════════════════════════════════════════════════════════════════════════════

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: Consumer<f32>,
    failure: &Arc<Mutex<Option<String>>>,
) -> AudioResult<Stream>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let failure = Arc::clone(failure);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = if consumer.slots() >= 2 {
                        (
                            consumer.pop().unwrap_or(0.0),
                            consumer.pop().unwrap_or(0.0),
                        )
                    } else {
                        (0.0, 0.0)
                    };

                    match frame {
                        [mono] => *mono = T::from_sample((left + right) * 0.5),
                        [l, r, extra @ ..] => {
                            *l = T::from_sample(left);
                            *r = T::from_sample(right);
                            for sample in extra {
                                *sample = T::EQUILIBRIUM;
                            }
                        }
                        [] => {}
                    }
                }
            },
            move |err| {
                log::error!("Playback stream error: {}", err);
                *failure.lock() = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}
