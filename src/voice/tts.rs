//! Text-to-speech (TTS) over an OpenAI-compatible HTTP API

use crate::audio::{AudioChunk, decode_mp3};
use crate::voice::TtsEngine;
use crate::voice::stt::block_on_runtime;
use crate::{Error, Result};

/// Synthesizes speech through `POST {base_url}/audio/speech`
pub struct OpenAiTts {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    voice: String,
    speed: f32,
    model: String,
}

impl OpenAiTts {
    /// Create a client for the given API base (e.g. `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if the hosted API is used without a key
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        voice: String,
        speed: f32,
        model: String,
    ) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.is_empty());
        if api_key.is_none() && base_url.contains("api.openai.com") {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            voice,
            speed,
            model,
        })
    }

    /// Synthesize text to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize_mp3(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "mp3",
        };

        let mut builder = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

impl TtsEngine for OpenAiTts {
    fn synthesize(&self, text: &str) -> Result<AudioChunk> {
        let mp3 = block_on_runtime(self.synthesize_mp3(text))?;
        let chunk = decode_mp3(&mp3)?;
        tracing::trace!(
            chars = text.len(),
            samples = chunk.samples.len(),
            sample_rate = chunk.sample_rate,
            "synthesized"
        );
        Ok(chunk)
    }
}
