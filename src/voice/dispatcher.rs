//! Hands closed segments to STT and forwards the text to the bridge

use std::sync::Arc;

use crate::audio::{SAMPLE_RATE, SpeechSegment};
use crate::transport::{TranscriptionMessage, Transport};
use crate::voice::SttEngine;
use crate::{Error, Result};

/// Result of dispatching one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transcribed and accepted by the bridge
    Sent(TranscriptionMessage),
    /// STT returned nothing worth sending
    Empty,
    /// STT failed; nothing was sent
    SttFailed(String),
    /// Transcribed, but the bridge did not accept it; the utterance is dropped
    SendFailed {
        /// The message that could not be delivered
        message: TranscriptionMessage,
        /// Why delivery failed
        error: String,
    },
}

impl DispatchOutcome {
    /// The transcribed text, if STT produced any
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Sent(message) | Self::SendFailed { message, .. } => Some(&message.text),
            Self::Empty | Self::SttFailed(_) => None,
        }
    }
}

/// Runs STT off the frame path and fires the transcription at the transport
pub struct Dispatcher {
    stt: Arc<dyn SttEngine>,
    transport: Arc<dyn Transport>,
    session_id: String,
}

impl Dispatcher {
    /// Create a dispatcher for one session
    #[must_use]
    pub fn new(
        stt: Arc<dyn SttEngine>,
        transport: Arc<dyn Transport>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            stt,
            transport,
            session_id: session_id.into(),
        }
    }

    /// Transcribe a segment on the blocking pool
    ///
    /// Returns the trimmed text, which may be empty.
    ///
    /// # Errors
    ///
    /// Returns error if the STT engine fails or its task panics
    pub async fn transcribe(&self, segment: SpeechSegment) -> Result<String> {
        let stt = Arc::clone(&self.stt);
        let samples = segment.samples;

        let text = tokio::task::spawn_blocking(move || stt.transcribe(&samples, SAMPLE_RATE))
            .await
            .map_err(|e| Error::Stt(format!("transcription task failed: {e}")))??;

        Ok(text.trim().to_string())
    }

    /// Transcribe and send, never retrying
    pub async fn dispatch(&self, segment: SpeechSegment) -> DispatchOutcome {
        let duration_ms = segment.duration().as_millis();

        let text = match self.transcribe(segment).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return DispatchOutcome::SttFailed(e.to_string());
            }
        };

        if text.is_empty() {
            tracing::debug!(duration_ms, "empty transcription, nothing sent");
            return DispatchOutcome::Empty;
        }

        tracing::info!(text = %text, duration_ms, "transcribed");

        let message = TranscriptionMessage::new(text, self.session_id.clone());
        match self.transport.send_transcription(&message).await {
            Ok(()) => DispatchOutcome::Sent(message),
            Err(e) => {
                tracing::warn!(error = %e, "failed to send transcription, utterance dropped");
                DispatchOutcome::SendFailed {
                    message,
                    error: e.to_string(),
                }
            }
        }
    }
}
