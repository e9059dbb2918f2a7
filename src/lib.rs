//! Beacon Satellite - voice front end for remote AI agents
//!
//! The satellite listens for a wake word, segments the utterance that follows,
//! transcribes it and forwards the text to an agent bridge. Replies come back as
//! speak commands which are synthesized sentence by sentence and played while
//! staying interruptible by a new wake word (barge-in).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   frames   ┌────────────┐  segment  ┌────────────┐
//! │   Capture    ├───────────►│ Segmenter  ├──────────►│ Dispatcher │──► Transport.send
//! └──────────────┘            └─────┬──────┘           └────────────┘
//!                                   │ wake word                 │
//!                                   ▼                           ▼
//!                           ┌───────────────┐           ┌───────────────┐
//!                           │  Orchestrator │◄──────────┤Waiting feedback│
//!                           └───────┬───────┘           └───────────────┘
//!            Transport.poll ───────►│ speak command
//!                                   ▼
//!                           ┌───────────────┐  chunks   ┌──────────────┐
//!                           │ Speech engine ├──────────►│   Playback   │
//!                           └───────────────┘           └──────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod feedback;
pub mod pipeline;
pub mod speech;
pub mod transport;
pub mod voice;

pub use audio::{AudioChunk, AudioFrame, AudioSink, FRAME_SAMPLES, SAMPLE_RATE, SpeechSegment};
pub use config::Config;
pub use error::{Error, Result};
pub use feedback::{FeedbackCue, FeedbackMode, WaitingChime, WaitingFeedback};
pub use pipeline::{Pipeline, PipelineEvent, PipelineHandle, PipelineState};
pub use speech::{SpeechEngine, TtsQueue, split_sentences};
pub use transport::{HttpTransport, SpeakCommand, TranscriptionMessage, Transport};
pub use voice::{Segmenter, SegmenterEvent, SttEngine, TtsEngine, VadModel, WakeWordEvent, WakeWordModel};
