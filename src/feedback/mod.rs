//! Waiting feedback
//!
//! Fills the silence between sending a transcription and hearing back from
//! the agent, either with a looping earcon or with timed tones and phrases.

mod chime;
mod phrases;

use std::fmt;
use std::str::FromStr;

use crate::audio::AudioChunk;
use crate::Error;

pub use chime::{DEFAULT_CHIME_INTERVAL, WaitingChime};
pub use phrases::{
    DEFAULT_ACKNOWLEDGMENT_PHRASES, DEFAULT_WAITING_PHRASES, WaitingFeedback, WaitingSession,
};

/// Which waiting strategy runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedbackMode {
    /// Looping earcon
    #[default]
    Chime,
    /// Timed tones and spoken phrases
    Phrases,
    /// Both at once
    Both,
    /// Nothing
    Off,
}

impl FeedbackMode {
    /// Whether the earcon loop runs
    #[must_use]
    pub const fn uses_chime(self) -> bool {
        matches!(self, Self::Chime | Self::Both)
    }

    /// Whether the phrase/tone engine runs
    #[must_use]
    pub const fn uses_phrases(self) -> bool {
        matches!(self, Self::Phrases | Self::Both)
    }

    /// Config/CLI spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chime => "chime",
            Self::Phrases => "phrases",
            Self::Both => "both",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chime" => Ok(Self::Chime),
            "phrases" => Ok(Self::Phrases),
            "both" => Ok(Self::Both),
            "off" | "none" => Ok(Self::Off),
            other => Err(Error::Config(format!(
                "unknown feedback mode '{other}' (expected chime, phrases, both or off)"
            ))),
        }
    }
}

/// One piece of feedback the phrase engine wants played
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackCue {
    /// Ready-to-play tone audio
    Tone(AudioChunk),
    /// Text to synthesize and speak
    Phrase(String),
}
