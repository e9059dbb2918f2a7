//! Audio playback to speakers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Preferred device rate (matches common TTS output)
const PREFERRED_SAMPLE_RATE: u32 = 24000;

/// How often a blocking `play` checks for cancellation
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Destination for synthesized and feedback audio
///
/// `play` blocks until the samples have been played, `cancel` fires, or
/// `stop` is called from another thread. Implementations must return within
/// one poll interval of either interruption.
pub trait AudioSink: Send + Sync {
    /// Play mono samples at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the output device fails
    fn play(&self, samples: &[i16], sample_rate: u32, cancel: &CancellationToken) -> Result<()>;

    /// Interrupt whatever is currently playing
    fn stop(&self);
}

/// Plays audio to an output device through cpal
pub struct CpalSink {
    device_name: Option<String>,
    config: StreamConfig,
    stop_epoch: AtomicU64,
}

impl CpalSink {
    /// Open the named output device, or the default one
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device_name = device_name
            .filter(|n| *n != "default")
            .map(ToString::to_string);
        let device = find_output_device(device_name.as_deref())?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PREFERRED_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PREFERRED_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PREFERRED_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PREFERRED_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PREFERRED_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PREFERRED_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            device_name,
            config,
            stop_epoch: AtomicU64::new(0),
        })
    }

    /// Device output rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl AudioSink for CpalSink {
    fn play(&self, samples: &[i16], sample_rate: u32, cancel: &CancellationToken) -> Result<()> {
        if samples.is_empty() || cancel.is_cancelled() {
            return Ok(());
        }

        let epoch = self.stop_epoch.load(Ordering::Acquire);
        let device_rate = self.config.sample_rate.0;

        let normalized: Vec<f32> = samples.iter().map(|&s| f32::from(s) / 32768.0).collect();
        let output = if sample_rate == device_rate {
            normalized
        } else {
            resample(&normalized, sample_rate, device_rate)?
        };

        let device = find_output_device(self.device_name.as_deref())?;
        let channels = self.config.channels as usize;
        let sample_count = output.len();

        let state = Arc::new(Mutex::new(PlaybackCursor {
            samples: output,
            position: 0,
        }));
        let callback_state = Arc::clone(&state);

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut cursor) = callback_state.lock() else {
                        data.fill(0.0);
                        return;
                    };
                    for frame in data.chunks_mut(channels) {
                        let sample = cursor.next();
                        frame.fill(sample);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (sample_count as u64 * 1000) / u64::from(device_rate);
        let timeout = Duration::from_millis(duration_ms + 500);
        let start = Instant::now();

        loop {
            if cancel.is_cancelled() || self.stop_epoch.load(Ordering::Acquire) != epoch {
                tracing::debug!("playback interrupted");
                break;
            }
            let finished = state.lock().map_or(true, |c| c.position >= c.samples.len());
            if finished || start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(CANCEL_POLL);
        }

        drop(stream);
        tracing::trace!(samples = sample_count, "playback complete");
        Ok(())
    }

    fn stop(&self) {
        self.stop_epoch.fetch_add(1, Ordering::AcqRel);
    }
}

struct PlaybackCursor {
    samples: Vec<f32>,
    position: usize,
}

impl PlaybackCursor {
    fn next(&mut self) -> f32 {
        let sample = self.samples.get(self.position).copied().unwrap_or(0.0);
        if self.position < self.samples.len() {
            self.position += 1;
        }
        sample
    }
}

fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("output device not found: {name}"))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string())),
    }
}

/// Names of the available output devices
#[must_use]
pub fn list_output_devices() -> Vec<String> {
    cpal::default_host()
        .output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

/// Resample mono audio between rates
///
/// # Errors
///
/// Returns error if the resampler rejects the rates
pub fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, 1024, 2, 1)
        .map_err(|e| Error::Audio(format!("resampler: {e}")))?;

    let mut out = Vec::with_capacity(samples.len() * to as usize / from as usize + 1024);
    let mut pos = 0;

    while pos + resampler.input_frames_next() <= samples.len() {
        let needed = resampler.input_frames_next();
        let block: [&[f32]; 1] = [&samples[pos..pos + needed]];
        let frames = resampler
            .process(&block[..], None)
            .map_err(|e| Error::Audio(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
        pos += needed;
    }

    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let frames = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| Error::Audio(format!("resample: {e}")))?;
        out.extend_from_slice(&frames[0]);
    }

    Ok(out)
}
