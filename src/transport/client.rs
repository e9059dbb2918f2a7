//! Bridge transport
//!
//! The bridge speaks plain HTTP: transcriptions are POSTed and speak commands
//! are polled. Nothing here assumes a push channel.

use std::time::Duration;

use async_trait::async_trait;

use crate::transport::messages::{
    BridgeMessage, Capabilities, ConnectMessage, SpeakCommand, TranscriptionMessage, parse_speak,
};
use crate::{Error, Result};

/// Port the voice bridge listens on
pub const BRIDGE_PORT: u16 = 8081;

/// Timeout for outbound messages
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for speak polls
const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection to the agent bridge
#[async_trait]
pub trait Transport: Send + Sync {
    /// Announce this satellite; failures are non-fatal
    ///
    /// # Errors
    ///
    /// Returns error if the bridge rejects or cannot be reached
    async fn connect(&self) -> Result<()>;

    /// Deliver a transcription without waiting for a reply
    ///
    /// # Errors
    ///
    /// Returns error if the bridge did not accept the message
    async fn send_transcription(&self, message: &TranscriptionMessage) -> Result<()>;

    /// Fetch the next speak command, if any
    async fn poll_speak(&self) -> Option<SpeakCommand>;

    /// Drop speak commands the bridge has queued but not yet delivered
    async fn discard_pending(&self) {}
}

/// Identity sent in the connect handshake
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub account_id: String,
    pub capabilities: Capabilities,
}

/// Polling HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    identity: DeviceIdentity,
}

impl HttpTransport {
    /// Create a transport for the configured bridge endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint is not a ws/wss/http/https URL
    pub fn new(endpoint: &str, identity: DeviceIdentity) -> Result<Self> {
        let base_url = derive_bridge_url(endpoint)?;
        tracing::debug!(endpoint, base_url = %base_url, "bridge transport initialized");

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            identity,
        })
    }

    /// Create a transport for an already-derived base URL such as `http://10.0.0.5:8081`
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>, identity: DeviceIdentity) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
        }
    }

    /// Base URL all requests go to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, path: &str, message: &BridgeMessage) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .timeout(SEND_TIMEOUT)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("bridge returned {status} for {path}")));
        }
        Ok(())
    }

    async fn fetch_speak(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/speak", self.base_url))
            .timeout(POLL_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("bridge returned {status} for /speak")));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<()> {
        let message = BridgeMessage::Connect(ConnectMessage {
            device_id: self.identity.device_id.clone(),
            account_id: self.identity.account_id.clone(),
            capabilities: self.identity.capabilities,
        });
        self.post("/connect", &message).await?;
        tracing::info!(
            device_id = %self.identity.device_id,
            base_url = %self.base_url,
            "connected to bridge"
        );
        Ok(())
    }

    async fn send_transcription(&self, message: &TranscriptionMessage) -> Result<()> {
        self.post("/transcription", &BridgeMessage::Transcription(message.clone()))
            .await?;
        tracing::debug!(chars = message.text.len(), "transcription sent");
        Ok(())
    }

    async fn poll_speak(&self) -> Option<SpeakCommand> {
        match self.fetch_speak().await {
            Ok(body) => {
                let command = parse_speak(&body)?;
                tracing::info!(
                    source = %command.source_channel,
                    interrupt = command.interrupt,
                    text = %command.text,
                    "received speak command"
                );
                Some(command)
            }
            Err(e) => {
                tracing::trace!(error = %e, "speak poll failed");
                None
            }
        }
    }

    async fn discard_pending(&self) {
        // The bridge hands out one message per poll; drain what it already holds
        for _ in 0..16 {
            if self.poll_speak().await.is_none() {
                break;
            }
        }
    }
}

/// Map a configured endpoint to the bridge's HTTP base URL
///
/// `ws://` becomes `http://` and `wss://` becomes `https://`; the port is
/// replaced by (or set to) [`BRIDGE_PORT`] and any path is dropped.
///
/// # Errors
///
/// Returns error for unsupported schemes or a missing host
pub fn derive_bridge_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| Error::Config(format!("endpoint has no scheme: {endpoint}")))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => return Err(Error::Config(format!("unsupported endpoint scheme: {other}"))),
    };

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = if authority.starts_with('[') {
        // IPv6 literal, keep the brackets
        match authority.find(']') {
            Some(end) => &authority[..=end],
            None => return Err(Error::Config(format!("malformed endpoint host: {endpoint}"))),
        }
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    if host.is_empty() {
        return Err(Error::Config(format!("endpoint has no host: {endpoint}")));
    }

    Ok(format!("{scheme}://{host}:{BRIDGE_PORT}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_url_replaces_port() {
        assert_eq!(
            derive_bridge_url("ws://localhost:8082").unwrap(),
            "http://localhost:8081"
        );
        assert_eq!(
            derive_bridge_url("wss://bridge.example.com:443/voice").unwrap(),
            "https://bridge.example.com:8081"
        );
    }

    #[test]
    fn test_bridge_url_inserts_port() {
        assert_eq!(
            derive_bridge_url("ws://192.168.1.20").unwrap(),
            "http://192.168.1.20:8081"
        );
        assert_eq!(
            derive_bridge_url("http://[::1]:9000").unwrap(),
            "http://[::1]:8081"
        );
    }

    #[test]
    fn test_bridge_url_rejects_garbage() {
        assert!(derive_bridge_url("localhost:8082").is_err());
        assert!(derive_bridge_url("ftp://host").is_err());
        assert!(derive_bridge_url("ws://").is_err());
    }
}
