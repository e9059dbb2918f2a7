//! Voice processing module
//!
//! Model seams, utterance segmentation, transcription dispatch and the HTTP
//! STT/TTS backends used by the binary.

mod dispatcher;
mod models;
mod segmenter;
mod stt;
mod tts;
mod wake_word;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use models::{DEFAULT_ENERGY_THRESHOLD, EnergyVad, SttEngine, TtsEngine, VadModel, WakeWordModel};
pub use segmenter::{SegmentState, Segmenter, SegmenterConfig, SegmenterEvent, WakeWordEvent};
pub use stt::WhisperStt;
pub use tts::OpenAiTts;
pub use wake_word::{DetectorState, TranscriptWakeWord};
