//! Configuration management for the Beacon satellite
//!
//! Values resolve as env > TOML file > defaults; CLI flags in the binary
//! override the result.

pub mod file;

use std::path::PathBuf;

use crate::feedback::FeedbackMode;
use crate::{Error, Result};

use file::SatelliteConfigFile;

/// Beacon satellite configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Wake word and segmentation
    pub voice: VoiceConfig,

    /// Agent bridge
    pub transport: TransportConfig,

    /// Waiting feedback
    pub feedback: FeedbackConfig,

    /// STT/TTS backends
    pub speech: SpeechConfig,

    /// Audio devices
    pub audio: AudioConfig,
}

/// Wake word and segmentation configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Require the wake word before listening
    pub wake_word_enabled: bool,
    /// Wake phrase
    pub wake_word: String,
    /// Wake word confidence needed to trigger
    pub wake_word_threshold: f32,
    /// Return to waiting when no speech follows the wake word
    pub wake_word_timeout_sec: f64,
    /// Speech probability needed for a frame to count as speech
    pub vad_threshold: f32,
    /// Silence that ends an utterance
    pub silence_duration_sec: f64,
    /// Utterances shorter than this are dropped as noise
    pub min_speech_samples: usize,
    /// Consecutive speech frames needed to start an utterance
    pub speech_start_frames: u32,
    /// Longest run treated as a noise burst
    pub noise_burst_max_frames: u32,
    /// Hard cap on one utterance
    pub max_speech_duration_sec: f64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            wake_word_enabled: false,
            wake_word: "hey jarvis".to_string(),
            wake_word_threshold: 0.5,
            wake_word_timeout_sec: 10.0,
            vad_threshold: 0.5,
            silence_duration_sec: 1.5,
            min_speech_samples: 16000,
            speech_start_frames: 3,
            noise_burst_max_frames: 2,
            max_speech_duration_sec: 60.0,
        }
    }
}

/// Agent bridge configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bridge endpoint as configured (ws/wss/http/https)
    pub endpoint: String,
    /// Device identity, defaults to the hostname
    pub device_id: String,
    pub account_id: String,
    pub session_id: String,
    /// Speak poll cadence
    pub poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8082".to_string(),
            device_id: default_device_id(),
            account_id: "default".to_string(),
            session_id: "main".to_string(),
            poll_interval_ms: 200,
        }
    }
}

/// Waiting feedback configuration
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    pub mode: FeedbackMode,
    /// Earcon WAV for the chime
    pub earcon_path: Option<PathBuf>,
    pub chime_interval_ms: u64,
    pub ack_delay_ms: u64,
    pub first_phrase_delay_ms: u64,
    pub phrase_interval_ms: u64,
    pub tone_interval_ms: u64,
    /// Rate of generated tones
    pub sample_rate: u32,
    pub tone_volume: f32,
    pub tone_duration_ms: u32,
    pub tone_frequency_hz: f32,
    /// Waiting phrases per session before falling back to tones only
    pub max_phrases: u32,
    pub enable_ack_sound: bool,
    pub enable_ack_phrase: bool,
    pub enable_waiting_phrases: bool,
    pub enable_waiting_tones: bool,
    /// Replacement acknowledgment phrases (empty keeps the built-in pool)
    pub acknowledgment_phrases: Vec<String>,
    /// Replacement waiting phrases (empty keeps the built-in pool)
    pub waiting_phrases: Vec<String>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            mode: FeedbackMode::default(),
            earcon_path: None,
            chime_interval_ms: 5000,
            ack_delay_ms: 200,
            first_phrase_delay_ms: 1500,
            phrase_interval_ms: 6000,
            tone_interval_ms: 3000,
            sample_rate: 24000,
            tone_volume: 0.3,
            tone_duration_ms: 150,
            tone_frequency_hz: 800.0,
            max_phrases: 5,
            enable_ack_sound: true,
            enable_ack_phrase: true,
            enable_waiting_phrases: true,
            enable_waiting_tones: true,
            acknowledgment_phrases: Vec::new(),
            waiting_phrases: Vec::new(),
        }
    }
}

/// STT/TTS backend configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub stt_url: String,
    pub stt_model: String,
    pub tts_url: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub tts_speed: f32,
    pub api_key: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            stt_url: "https://api.openai.com/v1".to_string(),
            stt_model: "whisper-1".to_string(),
            tts_url: "https://api.openai.com/v1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            api_key: None,
        }
    }
}

/// Audio device selection
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Input device name (None = system default)
    pub input_device: Option<String>,
    /// Output device name (None = system default)
    pub output_device: Option<String>,
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an env lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn from_sources(fc: SatelliteConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| env(key).map(|v| is_truthy(&v));

        let voice_defaults = VoiceConfig::default();
        let voice = VoiceConfig {
            wake_word_enabled: flag("SATELLITE_WAKE_WORD_ENABLED")
                .or(fc.voice.wake_word_enabled)
                .unwrap_or(voice_defaults.wake_word_enabled),
            wake_word: env("SATELLITE_WAKE_WORD")
                .or(fc.voice.wake_word)
                .unwrap_or(voice_defaults.wake_word),
            wake_word_threshold: parsed(&env, "SATELLITE_WAKE_WORD_THRESHOLD")
                .or(fc.voice.wake_word_threshold)
                .unwrap_or(voice_defaults.wake_word_threshold),
            wake_word_timeout_sec: fc
                .voice
                .wake_word_timeout_sec
                .unwrap_or(voice_defaults.wake_word_timeout_sec),
            vad_threshold: parsed(&env, "SATELLITE_VAD_THRESHOLD")
                .or(fc.voice.vad_threshold)
                .unwrap_or(voice_defaults.vad_threshold),
            silence_duration_sec: fc
                .voice
                .silence_duration_sec
                .unwrap_or(voice_defaults.silence_duration_sec),
            min_speech_samples: fc
                .voice
                .min_speech_samples
                .unwrap_or(voice_defaults.min_speech_samples),
            speech_start_frames: fc
                .voice
                .speech_start_frames
                .unwrap_or(voice_defaults.speech_start_frames),
            noise_burst_max_frames: fc
                .voice
                .noise_burst_max_frames
                .unwrap_or(voice_defaults.noise_burst_max_frames),
            max_speech_duration_sec: fc
                .voice
                .max_speech_duration_sec
                .unwrap_or(voice_defaults.max_speech_duration_sec),
        };

        let transport_defaults = TransportConfig::default();
        let transport = TransportConfig {
            endpoint: env("SATELLITE_ENDPOINT")
                .or(fc.transport.endpoint)
                .unwrap_or(transport_defaults.endpoint),
            device_id: env("SATELLITE_DEVICE_ID")
                .or(fc.transport.device_id)
                .unwrap_or(transport_defaults.device_id),
            account_id: env("SATELLITE_ACCOUNT_ID")
                .or(fc.transport.account_id)
                .unwrap_or(transport_defaults.account_id),
            session_id: env("SATELLITE_SESSION_ID")
                .or(fc.transport.session_id)
                .unwrap_or(transport_defaults.session_id),
            poll_interval_ms: parsed(&env, "SATELLITE_POLL_INTERVAL_MS")
                .or(fc.transport.poll_interval_ms)
                .unwrap_or(transport_defaults.poll_interval_ms),
        };

        let feedback_defaults = FeedbackConfig::default();
        let mode = match env("SATELLITE_FEEDBACK_MODE").or(fc.feedback.mode.clone()) {
            Some(mode) => mode.parse()?,
            None => feedback_defaults.mode,
        };
        let ff = fc.feedback;
        let feedback = FeedbackConfig {
            mode,
            earcon_path: env("SATELLITE_EARCON")
                .or(ff.earcon_path)
                .map(PathBuf::from)
                .or(feedback_defaults.earcon_path),
            chime_interval_ms: ff
                .chime_interval_ms
                .unwrap_or(feedback_defaults.chime_interval_ms),
            ack_delay_ms: ff.ack_delay_ms.unwrap_or(feedback_defaults.ack_delay_ms),
            first_phrase_delay_ms: ff
                .first_phrase_delay_ms
                .unwrap_or(feedback_defaults.first_phrase_delay_ms),
            phrase_interval_ms: ff
                .phrase_interval_ms
                .unwrap_or(feedback_defaults.phrase_interval_ms),
            tone_interval_ms: ff
                .tone_interval_ms
                .unwrap_or(feedback_defaults.tone_interval_ms),
            sample_rate: ff.sample_rate.unwrap_or(feedback_defaults.sample_rate),
            tone_volume: ff.tone_volume.unwrap_or(feedback_defaults.tone_volume),
            tone_duration_ms: ff
                .tone_duration_ms
                .unwrap_or(feedback_defaults.tone_duration_ms),
            tone_frequency_hz: ff
                .tone_frequency_hz
                .unwrap_or(feedback_defaults.tone_frequency_hz),
            max_phrases: ff.max_phrases.unwrap_or(feedback_defaults.max_phrases),
            enable_ack_sound: ff
                .enable_ack_sound
                .unwrap_or(feedback_defaults.enable_ack_sound),
            enable_ack_phrase: ff
                .enable_ack_phrase
                .unwrap_or(feedback_defaults.enable_ack_phrase),
            enable_waiting_phrases: ff
                .enable_waiting_phrases
                .unwrap_or(feedback_defaults.enable_waiting_phrases),
            enable_waiting_tones: ff
                .enable_waiting_tones
                .unwrap_or(feedback_defaults.enable_waiting_tones),
            acknowledgment_phrases: ff.acknowledgment_phrases.unwrap_or_default(),
            waiting_phrases: ff.waiting_phrases.unwrap_or_default(),
        };

        let speech_defaults = SpeechConfig::default();
        #[allow(clippy::cast_possible_truncation)]
        let tts_speed = fc
            .speech
            .tts_speed
            .map_or(speech_defaults.tts_speed, |s| s as f32);
        let speech = SpeechConfig {
            stt_url: env("SATELLITE_STT_URL")
                .or(fc.speech.stt_url)
                .unwrap_or(speech_defaults.stt_url),
            stt_model: env("SATELLITE_STT_MODEL")
                .or(fc.speech.stt_model)
                .unwrap_or(speech_defaults.stt_model),
            tts_url: env("SATELLITE_TTS_URL")
                .or(fc.speech.tts_url)
                .unwrap_or(speech_defaults.tts_url),
            tts_model: env("SATELLITE_TTS_MODEL")
                .or(fc.speech.tts_model)
                .unwrap_or(speech_defaults.tts_model),
            tts_voice: env("SATELLITE_TTS_VOICE")
                .or(fc.speech.tts_voice)
                .unwrap_or(speech_defaults.tts_voice),
            tts_speed,
            api_key: env("OPENAI_API_KEY").or(fc.speech.api_key),
        };

        let audio = AudioConfig {
            input_device: env("SATELLITE_INPUT_DEVICE").or(fc.audio.input_device),
            output_device: env("SATELLITE_OUTPUT_DEVICE").or(fc.audio.output_device),
        };

        let config = Self {
            voice,
            transport,
            feedback,
            speech,
            audio,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that would otherwise misbehave at runtime
    ///
    /// # Errors
    ///
    /// Returns error naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be within 0..=1, got {v}")))
            }
        };
        unit("wake_word_threshold", self.voice.wake_word_threshold)?;
        unit("vad_threshold", self.voice.vad_threshold)?;
        unit("tone_volume", self.feedback.tone_volume)?;

        if self.voice.silence_duration_sec <= 0.0 {
            return Err(Error::Config("silence_duration_sec must be positive".to_string()));
        }
        if self.voice.max_speech_duration_sec <= self.voice.silence_duration_sec {
            return Err(Error::Config(
                "max_speech_duration_sec must exceed silence_duration_sec".to_string(),
            ));
        }
        if self.voice.wake_word_enabled && self.voice.wake_word.trim().is_empty() {
            return Err(Error::Config("wake word enabled but empty".to_string()));
        }
        if self.transport.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.feedback.sample_rate == 0 {
            return Err(Error::Config("feedback sample_rate must be positive".to_string()));
        }
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn default_device_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "satellite".to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(SatelliteConfigFile::default(), env_from(&[])).unwrap();

        assert!(!config.voice.wake_word_enabled);
        assert_eq!(config.voice.wake_word, "hey jarvis");
        assert_eq!(config.voice.min_speech_samples, 16000);
        assert_eq!(config.transport.endpoint, "ws://localhost:8082");
        assert_eq!(config.transport.session_id, "main");
        assert_eq!(config.transport.account_id, "default");
        assert_eq!(config.feedback.phrase_interval_ms, 6000);
        assert_eq!(config.feedback.mode, FeedbackMode::Chime);
        assert!(!config.transport.device_id.is_empty());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = file::parse_config_file(
            r#"
            [voice]
            wake_word = "hey computer"
            wake_word_enabled = false

            [transport]
            endpoint = "ws://file-host:8082"
            session_id = "kitchen"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("SATELLITE_WAKE_WORD_ENABLED", "true"),
                ("SATELLITE_ENDPOINT", "wss://env-host"),
                ("SATELLITE_FEEDBACK_MODE", "both"),
            ]),
        )
        .unwrap();

        assert!(config.voice.wake_word_enabled);
        assert_eq!(config.voice.wake_word, "hey computer");
        assert_eq!(config.transport.endpoint, "wss://env-host");
        assert_eq!(config.transport.session_id, "kitchen");
        assert_eq!(config.feedback.mode, FeedbackMode::Both);
    }

    #[test]
    fn test_unparseable_env_number_falls_back() {
        let config = Config::from_sources(
            SatelliteConfigFile::default(),
            env_from(&[("SATELLITE_POLL_INTERVAL_MS", "soon")]),
        )
        .unwrap();
        assert_eq!(config.transport.poll_interval_ms, 200);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let fc = file::parse_config_file("[voice]\nvad_threshold = 1.5\n").unwrap();
        assert!(Config::from_sources(fc, env_from(&[])).is_err());

        let fc = SatelliteConfigFile::default();
        assert!(Config::from_sources(fc, env_from(&[("SATELLITE_FEEDBACK_MODE", "loud")])).is_err());
    }

    #[test]
    fn test_phrase_pools_from_file() {
        let fc = file::parse_config_file(
            r#"
            [feedback]
            waiting_phrases = ["Hold on."]
            enable_ack_sound = false
            "#,
        )
        .unwrap();
        let config = Config::from_sources(fc, env_from(&[])).unwrap();

        assert_eq!(config.feedback.waiting_phrases, vec!["Hold on.".to_string()]);
        assert!(config.feedback.acknowledgment_phrases.is_empty());
        assert!(!config.feedback.enable_ack_sound);
    }
}
