//! Inference seams for wake word, VAD, STT and TTS
//!
//! The pipeline only ever sees these traits. Scoring models are called on
//! the frame path and must return quickly; the STT and TTS engines are
//! blocking and are always driven from the blocking pool.

use crate::audio::{AudioChunk, AudioFrame};
use crate::Result;

/// Scores how likely a frame completes the wake word
pub trait WakeWordModel: Send {
    /// The phrase this model listens for
    fn wake_word(&self) -> &str;

    /// Confidence in `[0, 1]` that the wake word was just spoken
    ///
    /// # Errors
    ///
    /// Returns error if inference fails; the frame is skipped
    fn score(&mut self, frame: &AudioFrame) -> Result<f32>;

    /// Drop any accumulated context
    fn reset(&mut self) {}
}

/// Classifies frames as speech or silence
pub trait VadModel: Send {
    /// Probability in `[0, 1]` that the frame contains speech
    ///
    /// # Errors
    ///
    /// Returns error if inference fails; the frame is skipped
    fn speech_probability(&mut self, frame: &AudioFrame) -> Result<f32>;

    /// Drop any recurrent state
    fn reset(&mut self) {}
}

/// Blocking speech-to-text
pub trait SttEngine: Send + Sync {
    /// Transcribe mono PCM at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String>;
}

/// Blocking text-to-speech
pub trait TtsEngine: Send + Sync {
    /// Synthesize one sentence
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    fn synthesize(&self, text: &str) -> Result<AudioChunk>;
}

/// Frame energy below this is treated as silence
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.03;

/// VAD based on RMS energy
///
/// Maps energy onto a pseudo-probability so that a frame exactly at the
/// threshold scores 0.5 and twice the threshold saturates at 1.0.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    /// Create with an energy threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

impl VadModel for EnergyVad {
    fn speech_probability(&mut self, frame: &AudioFrame) -> Result<f32> {
        if self.threshold <= 0.0 {
            return Ok(1.0);
        }
        Ok((0.5 * frame.energy() / self.threshold).min(1.0))
    }
}
