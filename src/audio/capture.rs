use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use hound::{WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::meter::AmplitudeMeter;
use crate::config::AudioConfig;

/// MIME type of the files written by [`CpalCapture`]
pub const AUDIO_MIME_TYPE: &str = "audio/wav";

/// Errors raised by a capture backend
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No default input device
    #[error("no input device available")]
    NoInputDevice,

    /// Device refused the requested configuration
    #[error("failed to configure input device: {0}")]
    Config(String),

    /// Stream could not be built, started or paused
    #[error("audio stream error: {0}")]
    Stream(String),

    /// `start` called while already capturing
    #[error("capture already running")]
    Busy,

    /// `stop` called without a running capture
    #[error("capture not running")]
    NotStarted,

    /// WAV encoding failed
    #[error("failed to write WAV file: {0}")]
    Encode(#[from] hound::Error),

    /// Filesystem error around the output file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hardware recorder driven by the recorder controller.
///
/// `start` begins writing a session to `path`; `stop` finalizes that file and
/// releases the device.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureBackend {
    /// Acquire the device and begin capture into `path`
    ///
    /// # Errors
    /// Returns error if the device cannot be acquired or configured
    fn start(&mut self, path: &Path) -> Result<(), CaptureError>;

    /// Halt capture, finalize the file and release the device
    ///
    /// # Errors
    /// Returns error if nothing is running or the file cannot be written
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Meter fed while capturing
    fn meter(&self) -> AmplitudeMeter;
}

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<(), CaptureError>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::Stream(e.to_string()))
    }
}

/// One running capture: the stream plus everything needed to finalize it
struct ActiveCapture {
    /// Dropping this releases the device
    stream_control: Box<dyn StreamControl>,
    /// Ring buffer consumer for reading captured samples
    ring_buffer_consumer: HeapCons<f32>,
    /// Gate checked by the stream callback
    is_recording: Arc<AtomicBool>,
    /// Set once the ring buffer overflowed (session ran past max duration)
    truncated: Arc<AtomicBool>,
    /// Output file
    path: PathBuf,
    /// Device sample rate in Hz
    device_sample_rate: u32,
    /// Number of audio channels
    device_channels: u16,
}

/// Capture backend on the default input device via CPAL.
///
/// The device is opened on `start` and released on `stop`; finished sessions
/// are written as 16-bit PCM mono WAV at the configured sample rate.
pub struct CpalCapture {
    target_sample_rate: u32,
    max_duration_secs: u32,
    meter: AmplitudeMeter,
    active: Option<ActiveCapture>,
}

impl CpalCapture {
    /// Creates an idle backend; no device is touched until `start`
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            target_sample_rate: config.sample_rate,
            max_duration_secs: config.max_duration_secs,
            meter: AmplitudeMeter::new(),
            active: None,
        }
    }

    fn open(&self, path: &Path) -> Result<ActiveCapture, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        let supported_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Config(e.to_string()))?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        // Sized for the longest allowed session so no samples are dropped
        let ring_buffer_capacity = (device_sample_rate as usize)
            * (device_channels as usize)
            * (self.max_duration_secs as usize);
        debug!(
            "ring buffer capacity: {} samples ({} seconds)",
            ring_buffer_capacity, self.max_duration_secs
        );
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (mut producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));
        let is_recording_clone = Arc::clone(&is_recording);
        let truncated = Arc::new(AtomicBool::new(false));
        let truncated_clone = Arc::clone(&truncated);
        let meter = self.meter.clone();
        let max_duration_secs = self.max_duration_secs;

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        meter.record_block(data);
                        if push_block(&mut producer, data, &truncated_clone) {
                            warn!(
                                "recording exceeded {}s, further audio is dropped",
                                max_duration_secs
                            );
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Config(e.to_string()))?;

        Ok(ActiveCapture {
            stream_control: Box::new(CpalStreamControl { stream }),
            ring_buffer_consumer,
            is_recording,
            truncated,
            path: path.to_path_buf(),
            device_sample_rate,
            device_channels,
        })
    }

    fn finish(&self, mut active: ActiveCapture) -> Result<(), CaptureError> {
        let _span = tracing::debug_span!("finish_capture").entered();
        let start_total = std::time::Instant::now();

        active.is_recording.store(false, Ordering::Relaxed);
        let paused = active.stream_control.pause();

        let mut samples = Vec::new();
        while let Some(sample) = active.ring_buffer_consumer.try_pop() {
            samples.push(sample);
        }
        // Release the device before encoding
        drop(active.stream_control);
        self.meter.reset();

        if let Err(e) = paused {
            warn!("failed to pause stream before release: {}", e);
        }

        let converted = to_mono_at_rate(
            &samples,
            active.device_channels,
            active.device_sample_rate,
            self.target_sample_rate,
        );
        write_wav(&converted, self.target_sample_rate, &active.path)?;

        let truncated = active.truncated.load(Ordering::Relaxed);
        if truncated {
            warn!(
                path = %active.path.display(),
                max_secs = self.max_duration_secs,
                "recording truncated at max duration"
            );
        }

        info!(
            path = %active.path.display(),
            truncated,
            captured = samples.len(),
            written = converted.len(),
            total_ms = start_total.elapsed().as_millis(),
            "capture finalized"
        );
        Ok(())
    }
}

impl CaptureBackend for CpalCapture {
    fn start(&mut self, path: &Path) -> Result<(), CaptureError> {
        let _span = tracing::debug_span!("start_capture").entered();
        if self.active.is_some() {
            return Err(CaptureError::Busy);
        }

        let active = self.open(path)?;
        self.meter.reset();

        // Set recording flag BEFORE resuming stream to avoid race condition
        active.is_recording.store(true, Ordering::Relaxed);
        active.stream_control.play()?;

        self.active = Some(active);
        info!(path = %path.display(), "capture started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        let active = self.active.take().ok_or(CaptureError::NotStarted)?;
        self.finish(active)
    }

    fn meter(&self) -> AmplitudeMeter {
        self.meter.clone()
    }
}

/// Push one callback block; returns true only for the first overflow
fn push_block(
    producer: &mut impl Producer<Item = f32>,
    data: &[f32],
    truncated: &AtomicBool,
) -> bool {
    let pushed = producer.push_slice(data);
    pushed < data.len() && !truncated.swap(true, Ordering::Relaxed)
}

/// Downmix interleaved samples to mono and resample with linear interpolation
pub fn to_mono_at_rate(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    let mono_samples = if channels <= 1 {
        samples.to_vec()
    } else {
        let channels_f64 = f64::from(channels);
        samples
            .chunks(channels as usize)
            .map(|frame| {
                let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
                // f64 → f32: audio samples are stored as f32, precision sufficient
                #[allow(clippy::cast_possible_truncation)]
                {
                    (sum_f64 / channels_f64) as f32
                }
            })
            .collect()
    };

    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || mono_samples.is_empty() {
        return mono_samples;
    }

    // Fractional index math needs f64 ↔ usize conversions
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let resampled = {
        let ratio = f64::from(from_rate) / f64::from(to_rate);
        let output_len = ((mono_samples.len() as f64) / ratio).ceil() as usize;
        let last = mono_samples.len() - 1;

        (0..output_len)
            .map(|i| {
                let src = (i as f64) * ratio;
                let floor = (src.floor() as usize).min(last);
                let ceil = (floor + 1).min(last);
                let fract = src - src.floor();
                let s1 = f64::from(mono_samples[floor]);
                let s2 = f64::from(mono_samples[ceil]);
                s1.mul_add(1.0 - fract, s2 * fract) as f32
            })
            .collect::<Vec<f32>>()
    };

    debug!(
        from_rate,
        to_rate,
        input_samples = mono_samples.len(),
        output_samples = resampled.len(),
        "resampled capture"
    );

    resampled
}

/// Write mono f32 samples as a 16-bit PCM WAV file
///
/// # Errors
/// Returns error if directory creation or file write fails
pub fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), CaptureError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        // Clamped to [-1, 1] so the product fits i16
        #[allow(clippy::cast_possible_truncation)]
        let scaled = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer.write_sample(scaled)?;
    }
    writer.finalize()?;

    debug!(path = %path.display(), samples = samples.len(), "WAV written");
    Ok(())
}
