//! Wake word detection
//!
//! Uses a hybrid approach: local energy gating picks out short utterances,
//! which are then transcribed off the frame path and checked for the phrase.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::audio::{AudioFrame, SAMPLE_RATE};
use crate::voice::{SttEngine, WakeWordModel};
use crate::{Error, Result};

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Longest utterance checked for the phrase (in samples)
const MAX_UTTERANCE_SAMPLES: usize = 48000; // 3 seconds

/// State of the wake word detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Detected potential speech, accumulating
    Listening,
    /// Utterance sent to STT, waiting for the transcript
    Verifying,
}

/// Wake word model that verifies candidate utterances with STT
pub struct TranscriptWakeWord {
    wake_word: String,
    stt: Arc<dyn SttEngine>,
    state: DetectorState,
    speech_buffer: Vec<i16>,
    silence_counter: usize,
    pending: Option<oneshot::Receiver<Result<String>>>,
}

impl TranscriptWakeWord {
    /// Create a detector for `wake_word` (e.g. "hey jarvis")
    #[must_use]
    pub fn new(wake_word: &str, stt: Arc<dyn SttEngine>) -> Self {
        let wake_word = normalize(wake_word);
        tracing::debug!(wake_word = %wake_word, "wake word detector initialized");

        Self {
            wake_word,
            stt,
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            pending: None,
        }
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Check if a transcript contains the wake word
    #[must_use]
    pub fn matches(&self, transcript: &str) -> bool {
        normalize(transcript).contains(&self.wake_word)
    }

    fn track_speech(&mut self, frame: &AudioFrame) -> Result<()> {
        let energy = frame.energy();
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(frame.samples());
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(frame.samples());

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += frame.len();
                }

                let complete = self.silence_counter > SILENCE_SAMPLES
                    && self.speech_buffer.len() > MIN_SPEECH_SAMPLES;
                if complete || self.speech_buffer.len() >= MAX_UTTERANCE_SAMPLES {
                    self.verify()?;
                } else if self.silence_counter > SILENCE_SAMPLES * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
            DetectorState::Verifying => {}
        }

        Ok(())
    }

    fn verify(&mut self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::WakeWord(format!("no runtime for verification: {e}")))?;

        let samples = std::mem::take(&mut self.speech_buffer);
        let stt = Arc::clone(&self.stt);
        let (tx, rx) = oneshot::channel();

        tracing::debug!(samples = samples.len(), "verifying candidate utterance");
        handle.spawn_blocking(move || {
            let _ = tx.send(stt.transcribe(&samples, SAMPLE_RATE));
        });

        self.pending = Some(rx);
        self.state = DetectorState::Verifying;
        Ok(())
    }

    fn poll_verification(&mut self) -> Option<bool> {
        let rx = self.pending.as_mut()?;
        match rx.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.reset();
                Some(false)
            }
            Ok(result) => {
                let matched = match result {
                    Ok(transcript) => {
                        let matched = self.matches(&transcript);
                        tracing::debug!(transcript = %transcript, matched, "wake word check");
                        matched
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "wake word transcription failed");
                        false
                    }
                };
                self.reset();
                Some(matched)
            }
        }
    }
}

impl WakeWordModel for TranscriptWakeWord {
    fn wake_word(&self) -> &str {
        &self.wake_word
    }

    fn score(&mut self, frame: &AudioFrame) -> Result<f32> {
        if self.state == DetectorState::Verifying {
            return Ok(match self.poll_verification() {
                Some(true) => 1.0,
                _ => 0.0,
            });
        }

        self.track_speech(frame)?;
        Ok(0.0)
    }

    fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.silence_counter = 0;
        self.pending = None;
    }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
