//! Utterance segmentation
//!
//! Turns per-frame VAD probabilities into speech segments. Speech start is
//! debounced over a few consecutive frames, short noise bursts inside a
//! pause are absorbed, and a hard cap bounds how long one segment can grow.

use std::time::Duration;

use crate::audio::{AudioFrame, SAMPLE_RATE, SpeechSegment, samples_to_duration};
use crate::config::VoiceConfig;

/// Emitted when a frame's wake word confidence crosses the threshold
#[derive(Debug, Clone, PartialEq)]
pub struct WakeWordEvent {
    /// The phrase that was detected
    pub word: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f32,
    /// Offset of the end of the triggering frame from capture start
    pub at: Duration,
}

/// What a frame did to the current utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmenterEvent {
    /// The start debounce was satisfied
    SpeechStarted {
        /// Offset of the first debounced frame
        at: Duration,
    },
    /// The utterance closed
    ///
    /// `segment` is `None` when it was too short and got discarded as noise.
    SpeechEnded {
        /// The accepted segment
        segment: Option<SpeechSegment>,
    },
}

/// Whether an utterance is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    /// No utterance, waiting for the start debounce
    Idle,
    /// Collecting samples for an open utterance
    Accumulating,
}

/// Thresholds and limits in frame/sample units
#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterConfig {
    /// Wake word confidence needed for a [`WakeWordEvent`]
    pub wake_word_threshold: f32,
    /// Speech probability at or above which a frame counts as speech
    pub vad_threshold: f32,
    /// Armed silence frames that close a segment
    pub silence_frames: u32,
    /// Segments shorter than this are discarded unless forced
    pub min_speech_samples: usize,
    /// Consecutive speech frames needed to open a segment
    pub speech_start_frames: u32,
    /// Longest speech or silence run treated as noise
    pub noise_burst_max_frames: u32,
    /// Segment length that forces a close
    pub max_speech_samples: usize,
}

impl SegmenterConfig {
    /// Convert second-based settings at the given frame size
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    #[must_use]
    pub fn from_voice(config: &VoiceConfig, frame_samples: usize) -> Self {
        let frame_sec = frame_samples.max(1) as f64 / f64::from(SAMPLE_RATE);
        let silence_frames = (config.silence_duration_sec.max(0.0) / frame_sec).ceil() as u32;
        let max_speech_samples =
            (config.max_speech_duration_sec.max(0.0) * f64::from(SAMPLE_RATE)) as usize;

        Self {
            wake_word_threshold: config.wake_word_threshold,
            vad_threshold: config.vad_threshold,
            silence_frames: silence_frames.max(1),
            min_speech_samples: config.min_speech_samples,
            speech_start_frames: config.speech_start_frames.max(1),
            noise_burst_max_frames: config.noise_burst_max_frames,
            max_speech_samples: max_speech_samples.max(frame_samples),
        }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::from_voice(&VoiceConfig::default(), crate::audio::FRAME_SAMPLES)
    }
}

/// Frame-by-frame segmentation state machine
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    state: SegmentState,
    /// Consecutive speech frames: debounce count while idle, burst length while accumulating
    speech_run: u32,
    /// Consecutive non-speech frames, including absorbed bursts
    silence_run: u32,
    buffer: Vec<i16>,
    start_sample: u64,
}

impl Segmenter {
    /// Create an idle segmenter
    #[must_use]
    pub const fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: SegmentState::Idle,
            speech_run: 0,
            silence_run: 0,
            buffer: Vec::new(),
            start_sample: 0,
        }
    }

    /// Current thresholds
    #[must_use]
    pub const fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Whether an utterance is open
    #[must_use]
    pub const fn state(&self) -> SegmentState {
        self.state
    }

    /// Samples collected so far, including debounce frames
    #[must_use]
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Silence frames counted toward closing the segment
    ///
    /// Reads zero until the current silence run is longer than a noise burst.
    #[must_use]
    pub const fn silence_timer(&self) -> u32 {
        if self.silence_run > self.config.noise_burst_max_frames {
            self.silence_run
        } else {
            0
        }
    }

    /// Check a wake word score against the threshold
    #[must_use]
    pub fn detect_wake_word(
        &self,
        frame: &AudioFrame,
        word: &str,
        confidence: f32,
    ) -> Option<WakeWordEvent> {
        (confidence >= self.config.wake_word_threshold).then(|| WakeWordEvent {
            word: word.to_string(),
            confidence,
            at: frame_end(frame),
        })
    }

    /// Feed one frame with its speech probability
    pub fn push(&mut self, frame: &AudioFrame, speech_probability: f32) -> Option<SegmenterEvent> {
        let is_speech = speech_probability >= self.config.vad_threshold;

        match self.state {
            SegmentState::Idle => self.push_idle(frame, is_speech),
            SegmentState::Accumulating => self.push_accumulating(frame, is_speech),
        }
    }

    /// Abandon any open utterance and clear the debounce
    pub fn reset(&mut self) {
        self.state = SegmentState::Idle;
        self.speech_run = 0;
        self.silence_run = 0;
        self.buffer.clear();
        self.start_sample = 0;
    }

    fn push_idle(&mut self, frame: &AudioFrame, is_speech: bool) -> Option<SegmenterEvent> {
        if !is_speech {
            self.speech_run = 0;
            self.buffer.clear();
            return None;
        }

        if self.speech_run == 0 {
            self.start_sample = frame_start_sample(frame);
        }
        self.speech_run += 1;
        self.buffer.extend_from_slice(frame.samples());

        if self.speech_run < self.config.speech_start_frames {
            return None;
        }

        self.state = SegmentState::Accumulating;
        self.speech_run = 0;
        self.silence_run = 0;

        let at = sample_offset(self.start_sample);
        tracing::debug!(at_ms = at.as_millis(), "speech started");
        Some(SegmenterEvent::SpeechStarted { at })
    }

    fn push_accumulating(&mut self, frame: &AudioFrame, is_speech: bool) -> Option<SegmenterEvent> {
        self.buffer.extend_from_slice(frame.samples());

        if is_speech {
            if self.silence_timer() > 0 {
                self.speech_run += 1;
                if self.speech_run > self.config.noise_burst_max_frames {
                    // Real speech resumed
                    self.silence_run = 0;
                    self.speech_run = 0;
                } else {
                    self.silence_run += 1;
                }
            } else {
                self.silence_run = 0;
            }
        } else {
            self.speech_run = 0;
            self.silence_run += 1;
        }

        if self.silence_timer() >= self.config.silence_frames {
            return Some(self.close(false));
        }

        if self.buffer.len() >= self.config.max_speech_samples {
            return Some(self.close(true));
        }

        None
    }

    fn close(&mut self, forced: bool) -> SegmenterEvent {
        let samples = std::mem::take(&mut self.buffer);
        let start = sample_offset(self.start_sample);
        let end = sample_offset(self.start_sample + samples.len() as u64);
        self.reset();

        if !forced && samples.len() < self.config.min_speech_samples {
            tracing::debug!(samples = samples.len(), "segment too short, discarded");
            return SegmenterEvent::SpeechEnded { segment: None };
        }

        tracing::debug!(
            samples = samples.len(),
            forced,
            duration_ms = end.saturating_sub(start).as_millis(),
            "speech segment complete"
        );

        SegmenterEvent::SpeechEnded {
            segment: Some(SpeechSegment {
                samples,
                start,
                end,
                forced,
            }),
        }
    }
}

fn frame_start_sample(frame: &AudioFrame) -> u64 {
    frame.index() * frame.len() as u64
}

fn frame_end(frame: &AudioFrame) -> Duration {
    sample_offset(frame_start_sample(frame) + frame.len() as u64)
}

#[allow(clippy::cast_possible_truncation)]
fn sample_offset(sample: u64) -> Duration {
    samples_to_duration(sample as usize, SAMPLE_RATE)
}
