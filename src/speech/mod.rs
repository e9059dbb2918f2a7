//! Streaming text-to-speech
//!
//! Responses are split into sentences, synthesized on the blocking pool and
//! played through a bounded queue that a barge-in can cancel at any point.

mod engine;
mod queue;
mod sentences;

pub use engine::{SpeechEngine, SpeechFinished};
pub use queue::{DEFAULT_QUEUE_CAPACITY, QueueOutcome, TtsConsumer, TtsQueue};
pub use sentences::split_sentences;
