//! Bridge wire schema
//!
//! Messages are camelCase JSON objects tagged by a `type` field. Inbound speak
//! responses are parsed leniently: unknown fields are ignored, any field may be
//! missing, and a response without usable text simply means "nothing to say".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound and inbound bridge messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    /// Satellite to bridge: a finished utterance
    Transcription(TranscriptionMessage),
    /// Satellite to bridge: one-time handshake
    Connect(ConnectMessage),
    /// Bridge to satellite: text to speak
    Speak(SpeakCommand),
}

/// A transcribed utterance, sent once per segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionMessage {
    pub text: String,
    pub session_id: String,
    pub is_final: bool,
}

impl TranscriptionMessage {
    /// Create a final transcription for a session
    #[must_use]
    pub fn new(text: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: session_id.into(),
            is_final: true,
        }
    }
}

/// Handshake announcing the device and what it can do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectMessage {
    pub device_id: String,
    pub account_id: String,
    pub capabilities: Capabilities,
}

/// Satellite capabilities advertised on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub stt: bool,
    pub tts: bool,
    pub wake_word: bool,
}

/// Text the agent wants spoken
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakCommand {
    pub text: String,
    #[serde(default)]
    pub source_channel: String,
    #[serde(default)]
    pub priority: i32,
    /// Cut off whatever is currently being spoken
    #[serde(default)]
    pub interrupt: bool,
}

impl SpeakCommand {
    /// A normal-priority command that waits its turn
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_channel: String::new(),
            priority: 0,
            interrupt: false,
        }
    }

    /// Builder: set the interrupt flag
    #[must_use]
    pub const fn with_interrupt(mut self, interrupt: bool) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Builder: set the originating channel
    #[must_use]
    pub fn with_source(mut self, source_channel: impl Into<String>) -> Self {
        self.source_channel = source_channel.into();
        self
    }
}

/// Every field optional and loosely typed so partial bodies still parse
///
/// A field with an unexpected type is ignored on its own rather than
/// discarding the whole command.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakWire {
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    source_channel: Option<Value>,
    #[serde(default)]
    priority: Option<Value>,
    #[serde(default)]
    interrupt: Option<Value>,
}

/// Parse a `GET /speak` body
///
/// Returns `None` for empty or malformed bodies and for bodies whose text is
/// absent, not a string, empty or the literal string `"null"`. The `type`
/// field is optional.
#[must_use]
pub fn parse_speak(body: &str) -> Option<SpeakCommand> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    let wire: SpeakWire = match serde_json::from_str(body) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed speak response");
            return None;
        }
    };

    let Some(Value::String(text)) = wire.text else {
        return None;
    };
    if text.trim().is_empty() || text == "null" {
        return None;
    }

    Some(SpeakCommand {
        text,
        source_channel: wire.source_channel.as_ref().map_or_else(String::new, lenient_string),
        priority: wire.priority.as_ref().and_then(lenient_priority).unwrap_or(0),
        interrupt: wire.interrupt.as_ref().and_then(lenient_bool).unwrap_or(false),
    })
}

fn lenient_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_priority(value: &Value) -> Option<i32> {
    let priority = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    priority.is_finite().then_some(priority as i32)
}

fn lenient_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|n| n.abs() > f64::EPSILON),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_wire_format() {
        let message = BridgeMessage::Transcription(TranscriptionMessage::new("hello", "main"));
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "type": "transcription",
                "text": "hello",
                "sessionId": "main",
                "isFinal": true
            })
        );
    }

    #[test]
    fn test_connect_wire_format() {
        let message = BridgeMessage::Connect(ConnectMessage {
            device_id: "kitchen".to_string(),
            account_id: "default".to_string(),
            capabilities: Capabilities {
                stt: true,
                tts: true,
                wake_word: false,
            },
        });
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["type"], "connect");
        assert_eq!(json["deviceId"], "kitchen");
        assert_eq!(json["capabilities"]["wakeWord"], false);
    }

    #[test]
    fn test_parse_full_speak() {
        let cmd = parse_speak(
            r#"{"type":"speak","text":"Hi there.","sourceChannel":"discord","priority":2,"interrupt":true}"#,
        )
        .unwrap();

        assert_eq!(cmd.text, "Hi there.");
        assert_eq!(cmd.source_channel, "discord");
        assert_eq!(cmd.priority, 2);
        assert!(cmd.interrupt);
    }

    #[test]
    fn test_parse_tolerates_order_and_extras() {
        let cmd = parse_speak(r#"{"extra":{"nested":[1,2]},"interrupt":false,"text":"ok"}"#).unwrap();
        assert_eq!(cmd.text, "ok");
        assert!(cmd.source_channel.is_empty());
        assert!(!cmd.interrupt);
    }

    #[test]
    fn test_parse_mistyped_fields_keep_text() {
        let cmd = parse_speak(r#"{"text":"hi","interrupt":"true","priority":"3"}"#).unwrap();
        assert_eq!(cmd.text, "hi");
        assert!(cmd.interrupt);
        assert_eq!(cmd.priority, 3);

        let cmd = parse_speak(
            r#"{"text":"hi","interrupt":{"now":true},"priority":[1],"sourceChannel":false}"#,
        )
        .unwrap();
        assert_eq!(cmd.text, "hi");
        assert!(!cmd.interrupt);
        assert_eq!(cmd.priority, 0);
        assert!(cmd.source_channel.is_empty());

        let cmd = parse_speak(r#"{"text":"hi","interrupt":1,"sourceChannel":7}"#).unwrap();
        assert!(cmd.interrupt);
        assert_eq!(cmd.source_channel, "7");
    }

    #[test]
    fn test_parse_no_message() {
        assert!(parse_speak(r#"{"text":42}"#).is_none());
        assert!(parse_speak("").is_none());
        assert!(parse_speak("{}").is_none());
        assert!(parse_speak(r#"{"text":null}"#).is_none());
        assert!(parse_speak(r#"{"text":"null"}"#).is_none());
        assert!(parse_speak(r#"{"text":""}"#).is_none());
        assert!(parse_speak(r#"{"text":"hi""#).is_none());
        assert!(parse_speak("not json").is_none());
    }
}
