//! TOML configuration file loading
//!
//! Supports `~/.config/omni/satellite/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SatelliteConfigFile {
    /// Wake word and VAD configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Agent bridge configuration
    #[serde(default)]
    pub transport: TransportFileConfig,

    /// Waiting feedback configuration
    #[serde(default)]
    pub feedback: FeedbackFileConfig,

    /// STT/TTS backend configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Audio device selection
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Wake word and segmentation settings
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    pub wake_word_enabled: Option<bool>,
    pub wake_word: Option<String>,
    pub wake_word_threshold: Option<f32>,
    pub wake_word_timeout_sec: Option<f64>,
    pub vad_threshold: Option<f32>,
    pub silence_duration_sec: Option<f64>,
    pub min_speech_samples: Option<usize>,
    pub speech_start_frames: Option<u32>,
    pub noise_burst_max_frames: Option<u32>,
    pub max_speech_duration_sec: Option<f64>,
}

/// Agent bridge settings
#[derive(Debug, Default, Deserialize)]
pub struct TransportFileConfig {
    /// Bridge endpoint (e.g. "ws://localhost:8082")
    pub endpoint: Option<String>,
    pub device_id: Option<String>,
    pub account_id: Option<String>,
    pub session_id: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

/// Waiting feedback settings
#[derive(Debug, Default, Deserialize)]
pub struct FeedbackFileConfig {
    /// "chime", "phrases", "both" or "off"
    pub mode: Option<String>,
    pub earcon_path: Option<String>,
    pub chime_interval_ms: Option<u64>,
    pub ack_delay_ms: Option<u64>,
    pub first_phrase_delay_ms: Option<u64>,
    pub phrase_interval_ms: Option<u64>,
    pub tone_interval_ms: Option<u64>,
    pub sample_rate: Option<u32>,
    pub tone_volume: Option<f32>,
    pub tone_duration_ms: Option<u32>,
    pub tone_frequency_hz: Option<f32>,
    pub max_phrases: Option<u32>,
    pub enable_ack_sound: Option<bool>,
    pub enable_ack_phrase: Option<bool>,
    pub enable_waiting_phrases: Option<bool>,
    pub enable_waiting_tones: Option<bool>,
    pub acknowledgment_phrases: Option<Vec<String>>,
    pub waiting_phrases: Option<Vec<String>>,
}

/// STT/TTS backend settings
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub stt_url: Option<String>,
    pub stt_model: Option<String>,
    pub tts_url: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_speed: Option<f64>,
    pub api_key: Option<String>,
}

/// Audio device selection
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config_file(content: &str) -> Result<SatelliteConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Load the TOML config file from the standard path
///
/// Returns `SatelliteConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SatelliteConfigFile {
    let Some(path) = config_file_path() else {
        return SatelliteConfigFile::default();
    };

    if !path.exists() {
        return SatelliteConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config_file(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SatelliteConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SatelliteConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/satellite/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("satellite")
            .join("config.toml")
    })
}
