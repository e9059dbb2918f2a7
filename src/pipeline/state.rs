//! Pipeline state

use std::fmt;

/// Where the pipeline is in the listen/transcribe/speak cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Constructed but not running
    #[default]
    NotInitialized,
    /// Only the wake word model sees frames
    WaitingForWakeWord,
    /// VAD is segmenting an utterance
    Listening,
    /// A segment is being transcribed
    ProcessingStt,
    /// A response is playing; only a wake word can interrupt
    Speaking,
    /// A fatal error stopped the pipeline
    Error,
}

impl PipelineState {
    /// Stable lowercase name for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::WaitingForWakeWord => "waiting_for_wake_word",
            Self::Listening => "listening",
            Self::ProcessingStt => "processing_stt",
            Self::Speaking => "speaking",
            Self::Error => "error",
        }
    }

    /// Whether a wake word in this state would be acted on
    #[must_use]
    pub const fn accepts_wake_word(self) -> bool {
        matches!(self, Self::WaitingForWakeWord | Self::Speaking)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
