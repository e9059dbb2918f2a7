//! Timed tones and phrases while waiting for a response
//!
//! Stages, all measured from the start of the session:
//!
//! 1. after the acknowledgment delay: a rising two-tone chime and a short phrase
//! 2. after the first-thinking delay: one soft tone
//! 3. from then on: a "still working" phrase every phrase interval, with
//!    gentle tones in between; phrases stop after the configured maximum

use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, generate_tone, silence};
use crate::config::FeedbackConfig;
use crate::feedback::FeedbackCue;

/// Built-in acknowledgment phrases
pub const DEFAULT_ACKNOWLEDGMENT_PHRASES: &[&str] = &[
    "Let me think about that.",
    "One moment, please.",
    "Let me check on that for you.",
    "Give me just a second.",
    "Sure, let me look into that.",
    "Alright, thinking...",
    "Got it, one moment.",
    "Let me see what I can find.",
    "Hmm, let me think.",
    "Working on it.",
];

/// Built-in "still waiting" phrases
pub const DEFAULT_WAITING_PHRASES: &[&str] = &[
    "Still working on that.",
    "Almost there.",
    "Just a bit longer.",
    "This might take a moment.",
    "Bear with me.",
    "I'm on it.",
    "Processing your request.",
    "Still thinking about that.",
    "Hang tight.",
    "Working through the details.",
];

/// One wait between dispatch and response
#[derive(Debug, Clone)]
pub struct WaitingSession {
    /// The transcription being answered
    pub query: String,
    pub start_time: Instant,
    /// Waiting phrases spoken so far
    pub phrase_count: u32,
    pub acknowledged: bool,
    pub first_phrase_played: bool,
    last_phrase: Instant,
    last_tone: Instant,
    cancel: CancellationToken,
}

impl WaitingSession {
    /// Token that fires when the session ends; every cue plays under it
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Time since the session started
    #[must_use]
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start_time)
    }
}

/// Phrase/tone engine, polled by the pipeline
#[derive(Debug)]
pub struct WaitingFeedback {
    config: FeedbackConfig,
    acknowledgment_phrases: Vec<String>,
    waiting_phrases: Vec<String>,
    session: Option<WaitingSession>,
}

impl WaitingFeedback {
    /// Create an idle engine
    #[must_use]
    pub fn new(config: FeedbackConfig) -> Self {
        let mut feedback = Self {
            acknowledgment_phrases: to_owned(DEFAULT_ACKNOWLEDGMENT_PHRASES),
            waiting_phrases: to_owned(DEFAULT_WAITING_PHRASES),
            session: None,
            config,
        };
        feedback.set_acknowledgment_phrases(feedback.config.acknowledgment_phrases.clone());
        feedback.set_waiting_phrases(feedback.config.waiting_phrases.clone());
        feedback
    }

    /// Replace the acknowledgment pool; an empty list is ignored
    pub fn set_acknowledgment_phrases(&mut self, phrases: Vec<String>) {
        if !phrases.is_empty() {
            self.acknowledgment_phrases = phrases;
        }
    }

    /// Replace the waiting pool; an empty list is ignored
    pub fn set_waiting_phrases(&mut self, phrases: Vec<String>) {
        if !phrases.is_empty() {
            self.waiting_phrases = phrases;
        }
    }

    /// Current acknowledgment pool
    #[must_use]
    pub fn acknowledgment_phrases(&self) -> &[String] {
        &self.acknowledgment_phrases
    }

    /// Current waiting pool
    #[must_use]
    pub fn waiting_phrases(&self) -> &[String] {
        &self.waiting_phrases
    }

    /// Begin a session now, ending any previous one
    pub fn start(&mut self, query: &str) -> CancellationToken {
        self.start_at(query, Instant::now())
    }

    /// Begin a session at `now`, ending any previous one
    pub fn start_at(&mut self, query: &str, now: Instant) -> CancellationToken {
        self.stop();

        let cancel = CancellationToken::new();
        self.session = Some(WaitingSession {
            query: query.to_string(),
            start_time: now,
            phrase_count: 0,
            acknowledged: false,
            first_phrase_played: false,
            last_phrase: now,
            last_tone: now,
            cancel: cancel.clone(),
        });
        tracing::debug!(query, "waiting feedback started");
        cancel
    }

    /// End the session and silence anything it scheduled
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            tracing::debug!(
                waited_ms = session.start_time.elapsed().as_millis(),
                phrases = session.phrase_count,
                "waiting feedback stopped"
            );
        }
    }

    /// Whether a session is running
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// The running session
    #[must_use]
    pub const fn session(&self) -> Option<&WaitingSession> {
        self.session.as_ref()
    }

    /// Advance the timers and return the cues due now
    pub fn update(&mut self) -> Vec<FeedbackCue> {
        self.update_at(Instant::now())
    }

    /// Advance the timers as of `now`
    pub fn update_at(&mut self, now: Instant) -> Vec<FeedbackCue> {
        let config = &self.config;
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        let elapsed = session.elapsed_at(now);
        let ack_delay = Duration::from_millis(config.ack_delay_ms);

        if !session.acknowledged {
            if elapsed < ack_delay {
                return Vec::new();
            }
            session.acknowledged = true;
            session.last_phrase = now;
            session.last_tone = now;
            return acknowledgment(config, &self.acknowledgment_phrases);
        }

        if !session.first_phrase_played {
            if elapsed < ack_delay + Duration::from_millis(config.first_phrase_delay_ms) {
                return Vec::new();
            }
            session.first_phrase_played = true;
            session.last_tone = now;
            if !config.enable_waiting_tones {
                return Vec::new();
            }
            return vec![FeedbackCue::Tone(tone(
                config,
                config.tone_frequency_hz,
                config.tone_volume * 0.7,
            ))];
        }

        let since_phrase = now.saturating_duration_since(session.last_phrase);
        let since_tone = now.saturating_duration_since(session.last_tone);

        let phrases_left = session.phrase_count < config.max_phrases;
        if config.enable_waiting_phrases
            && phrases_left
            && since_phrase >= Duration::from_millis(config.phrase_interval_ms)
        {
            session.last_phrase = now;
            session.last_tone = now;
            session.phrase_count += 1;
            return pick(&self.waiting_phrases)
                .map(FeedbackCue::Phrase)
                .into_iter()
                .collect();
        }

        if config.enable_waiting_tones && since_tone >= Duration::from_millis(config.tone_interval_ms) {
            session.last_tone = now;
            let variation = if session.phrase_count % 2 == 0 { 0.0 } else { 100.0 };
            return vec![FeedbackCue::Tone(tone(
                config,
                config.tone_frequency_hz + variation,
                config.tone_volume * 0.5,
            ))];
        }

        Vec::new()
    }
}

fn acknowledgment(config: &FeedbackConfig, phrases: &[String]) -> Vec<FeedbackCue> {
    let mut cues = Vec::new();

    if config.enable_ack_sound {
        // Two ascending tones
        let rate = config.sample_rate;
        let mut samples = generate_tone(rate, 600.0, 80, config.tone_volume * 0.6);
        samples.extend(silence(rate, 50));
        samples.extend(generate_tone(rate, 800.0, 100, config.tone_volume * 0.8));
        cues.push(FeedbackCue::Tone(AudioChunk::new(samples, rate)));
    }

    if config.enable_ack_phrase {
        cues.extend(pick(phrases).map(FeedbackCue::Phrase));
    }

    cues
}

fn tone(config: &FeedbackConfig, frequency_hz: f32, volume: f32) -> AudioChunk {
    AudioChunk::new(
        generate_tone(config.sample_rate, frequency_hz, config.tone_duration_ms, volume),
        config.sample_rate,
    )
}

fn pick(phrases: &[String]) -> Option<String> {
    phrases.choose(&mut rand::thread_rng()).cloned()
}

fn to_owned(phrases: &[&str]) -> Vec<String> {
    phrases.iter().map(ToString::to_string).collect()
}
