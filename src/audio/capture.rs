//! Audio capture from microphone

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::audio::{AudioFrame, FRAME_SAMPLES, SAMPLE_RATE, f32_to_i16};
use crate::{Error, Result};

/// What the capture thread delivers to the pipeline
#[derive(Debug)]
pub enum AudioInput {
    /// A complete frame of microphone audio
    Frame(AudioFrame),
    /// The input stream failed and will not recover
    Failed(String),
}

/// Slices an arbitrary callback cadence into fixed [`FRAME_SAMPLES`] frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<i16>,
    next_index: u64,
}

impl FrameAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples and return every frame that is now complete
    pub fn push(&mut self, samples: &[i16]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= FRAME_SAMPLES {
            let rest = self.pending.split_off(FRAME_SAMPLES);
            let frame = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(self.next_index, frame));
            self.next_index += 1;
        }
        frames
    }
}

/// Captures audio from an input device and forwards frames over a channel
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the named input device, or the default one
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(name) if name != "default" => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| Error::Audio(format!("input device not found: {name}")))?,
            _ => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string()))?,
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    /// Start capturing, delivering frames to `tx`
    ///
    /// Frames are dropped (with a warning) when the receiver falls behind, so the
    /// device callback never blocks.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self, tx: mpsc::Sender<AudioInput>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut assembler = FrameAssembler::new();
        let frame_tx = tx.clone();
        let error_tx = tx;

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in assembler.push(&f32_to_i16(data)) {
                        if let Err(mpsc::error::TrySendError::Full(_)) =
                            frame_tx.try_send(AudioInput::Frame(frame))
                        {
                            tracing::warn!("pipeline behind, dropping audio frame");
                        }
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    let _ = error_tx.try_send(AudioInput::Failed(err.to_string()));
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Names of the available input devices
#[must_use]
pub fn list_input_devices() -> Vec<String> {
    cpal::default_host()
        .input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}
