//! Streaming TTS engine
//!
//! `speak` splits a response into sentences and synthesizes sentence N+1
//! while sentence N plays. Every response gets a generation number; a
//! barge-in bumps the generation so nothing from the old response can reach
//! the speaker afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::audio::AudioSink;
use crate::speech::queue::{DEFAULT_QUEUE_CAPACITY, QueueOutcome, TtsQueue};
use crate::speech::split_sentences;
use crate::voice::TtsEngine;

/// Reported when a response's consumer exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechFinished {
    /// Generation returned by the `speak` call
    pub generation: u64,
    /// How the consumer stopped
    pub outcome: QueueOutcome,
}

/// Owns the current spoken response and the playback sink
pub struct SpeechEngine {
    tts: Arc<dyn TtsEngine>,
    sink: Arc<dyn AudioSink>,
    generation: Arc<AtomicU64>,
    current: Mutex<Option<TtsQueue>>,
    finished_tx: mpsc::UnboundedSender<SpeechFinished>,
    queue_capacity: usize,
}

impl SpeechEngine {
    /// Create an engine and the channel its completions arrive on
    #[must_use]
    pub fn new(
        tts: Arc<dyn TtsEngine>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<SpeechFinished>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        (
            Self {
                tts,
                sink,
                generation: Arc::new(AtomicU64::new(0)),
                current: Mutex::new(None),
                finished_tx,
                queue_capacity: DEFAULT_QUEUE_CAPACITY,
            },
            finished_rx,
        )
    }

    /// The synthesizer, shared with feedback phrases
    #[must_use]
    pub fn tts(&self) -> Arc<dyn TtsEngine> {
        Arc::clone(&self.tts)
    }

    /// The playback sink
    #[must_use]
    pub fn sink(&self) -> Arc<dyn AudioSink> {
        Arc::clone(&self.sink)
    }

    /// Generation of the most recent response (or cancellation)
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether a response is still queued or playing
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.current
            .lock()
            .is_ok_and(|c| c.as_ref().is_some_and(|q| !q.is_cancelled()))
    }

    /// Start speaking `text`, replacing any current response
    ///
    /// Returns immediately with the response's generation; a
    /// [`SpeechFinished`] with that generation follows when playback ends.
    /// Must be called from within a tokio runtime.
    pub fn speak(&self, text: &str) -> u64 {
        self.cancel_speech();

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let sentences = split_sentences(text);
        let (queue, consumer) = TtsQueue::new(self.queue_capacity);

        if let Ok(mut current) = self.current.lock() {
            *current = Some(queue.clone());
        }

        tracing::info!(generation, sentences = sentences.len(), "speaking");

        tokio::spawn(produce(
            sentences,
            queue.clone(),
            Arc::clone(&self.tts),
            Arc::clone(&self.generation),
            generation,
        ));

        let sink = Arc::clone(&self.sink);
        let finished_tx = self.finished_tx.clone();
        let current_generation = Arc::clone(&self.generation);
        tokio::spawn(async move {
            let outcome = consumer.run(sink).await;
            if current_generation.load(Ordering::Acquire) != generation {
                tracing::debug!(generation, "stale response finished");
            }
            let _ = finished_tx.send(SpeechFinished {
                generation,
                outcome,
            });
        });

        generation
    }

    /// Barge-in: silence the current response immediately
    ///
    /// Cancels the queue, stops hardware playback, abandons synthesis that has
    /// not been queued yet and invalidates the response's generation.
    pub fn cancel_speech(&self) {
        let queue = self.current.lock().ok().and_then(|mut c| c.take());
        let Some(queue) = queue else {
            return;
        };

        queue.cancel();
        self.sink.stop();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(generation, "speech cancelled");
    }

    /// Forget the current response once it finished on its own
    pub fn clear_finished(&self, generation: u64) {
        if self.generation() != generation {
            return;
        }
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
    }
}

async fn produce(
    sentences: Vec<String>,
    queue: TtsQueue,
    tts: Arc<dyn TtsEngine>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
) {
    let cancel = queue.cancel_token();

    for sentence in sentences {
        if cancel.is_cancelled() {
            break;
        }

        let tts = Arc::clone(&tts);
        let text = sentence.clone();
        let synthesis = tokio::task::spawn_blocking(move || tts.synthesize(&text));

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = synthesis => result,
        };

        let chunk = match result {
            Ok(Ok(chunk)) => chunk,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, sentence = %sentence, "synthesis failed, skipping sentence");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "synthesis task failed");
                continue;
            }
        };

        if current_generation.load(Ordering::Acquire) != generation {
            tracing::debug!(generation, "dropping audio from stale response");
            break;
        }

        if !queue.push(chunk).await {
            break;
        }
    }

    queue.finish();
}
