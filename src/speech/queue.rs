//! Bounded chunk queue between synthesis and playback
//!
//! One producer pushes synthesized sentences; one consumer plays them. The
//! queue lives for exactly one spoken response.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioChunk, AudioSink};

/// Chunks buffered ahead of playback
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// How a consumer stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    /// Every pushed chunk was played and the producer finished
    Completed,
    /// `cancel()` was called; remaining audio was discarded
    Cancelled,
}

/// Producer side of a response's chunk queue
///
/// Cheap to clone; every clone controls the same queue.
#[derive(Debug, Clone)]
pub struct TtsQueue {
    tx: mpsc::Sender<AudioChunk>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

/// Consumer side of a response's chunk queue
#[derive(Debug)]
pub struct TtsConsumer {
    rx: mpsc::Receiver<AudioChunk>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl TtsQueue {
    /// Create a queue holding at most `capacity` unplayed chunks
    #[must_use]
    pub fn new(capacity: usize) -> (Self, TtsConsumer) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        (
            Self {
                tx,
                cancel: cancel.clone(),
                finished: finished.clone(),
            },
            TtsConsumer {
                rx,
                cancel,
                finished,
            },
        )
    }

    /// Enqueue a chunk, waiting while the queue is full
    ///
    /// Returns `false` without enqueuing once the queue is finished or
    /// cancelled, or when the consumer is gone.
    pub async fn push(&self, chunk: AudioChunk) -> bool {
        if self.is_finished() || self.is_cancelled() {
            return false;
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(chunk) => sent.is_ok(),
        }
    }

    /// Signal that no more chunks will be pushed
    pub fn finish(&self) {
        self.finished.cancel();
    }

    /// Drop everything queued and stop the consumer
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether `finish()` was called
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Whether `cancel()` was called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the queue still accepts chunks
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_finished() && !self.is_cancelled() && !self.tx.is_closed()
    }

    /// Token that fires on `cancel()`, for work tied to this response
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl TtsConsumer {
    /// Wait for the next chunk
    ///
    /// Returns `None` once cancelled, or once finished and drained. After a
    /// cancel no further chunk is ever returned.
    pub async fn next(&mut self) -> Option<AudioChunk> {
        if self.cancel.is_cancelled() {
            self.discard();
            return None;
        }

        let chunk = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            chunk = self.rx.recv() => chunk,
            () = self.finished.cancelled() => self.rx.try_recv().ok(),
        };

        if self.cancel.is_cancelled() {
            self.discard();
            return None;
        }
        chunk
    }

    /// Play every chunk through `sink` until finished or cancelled
    pub async fn run(mut self, sink: Arc<dyn AudioSink>) -> QueueOutcome {
        let mut played = 0usize;

        while let Some(chunk) = self.next().await {
            if chunk.is_empty() {
                continue;
            }

            let sink = Arc::clone(&sink);
            let token = self.cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                sink.play(&chunk.samples, chunk.sample_rate, &token)
            })
            .await;

            match result {
                Ok(Ok(())) => played += 1,
                Ok(Err(e)) => tracing::warn!(error = %e, "chunk playback failed, skipping"),
                Err(e) => tracing::warn!(error = %e, "playback task failed"),
            }
        }

        let outcome = if self.cancel.is_cancelled() {
            QueueOutcome::Cancelled
        } else {
            QueueOutcome::Completed
        };
        tracing::debug!(played, ?outcome, "tts consumer exited");
        outcome
    }

    fn discard(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}
