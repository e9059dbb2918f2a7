//! Speech-to-text (STT) over a Whisper-compatible HTTP API

use crate::audio::samples_to_wav;
use crate::voice::SttEngine;
use crate::{Error, Result};

/// Response from a Whisper-compatible transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes speech through `POST {base_url}/audio/transcriptions`
pub struct WhisperStt {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperStt {
    /// Create a client for the given API base (e.g. `https://api.openai.com/v1`)
    ///
    /// A key is required for the hosted API; self-hosted servers may omit it.
    ///
    /// # Errors
    ///
    /// Returns error if the hosted API is used without a key
    pub fn new(base_url: &str, api_key: Option<String>, model: String) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.is_empty());
        if api_key.is_none() && base_url.contains("api.openai.com") {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    /// Transcribe WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the API rejects it
    pub async fn transcribe_wav(&self, audio: Vec<u8>) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::debug!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

impl SttEngine for WhisperStt {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<String> {
        let wav = samples_to_wav(samples, sample_rate)?;
        block_on_runtime(self.transcribe_wav(wav))
    }
}

/// Drive an HTTP future from a blocking-pool thread
///
/// # Errors
///
/// Returns error when called outside a tokio runtime
pub(crate) fn block_on_runtime<F: std::future::Future<Output = Result<T>>, T>(fut: F) -> Result<T> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::Config(format!("no async runtime for HTTP request: {e}")))?;
    handle.block_on(fut)
}
