//! Events published by the pipeline

use crate::pipeline::PipelineState;
use crate::voice::WakeWordEvent;

/// Everything observers can learn about a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The state machine moved
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    /// The wake word was detected
    WakeWord(WakeWordEvent),
    /// An utterance started (`true`) or ended (`false`)
    VoiceActivity { active: bool },
    /// A segment was transcribed and handed to the transport
    Transcription { text: String, is_final: bool },
    /// A response started playing
    Speaking { text: String, generation: u64 },
    /// A response was cut off by barge-in or an interrupting command
    SpeechInterrupted { generation: u64 },
    /// Something went wrong; `fatal` errors stop the pipeline
    Error { message: String, fatal: bool },
}
