//! Agent bridge transport and wire schema

mod client;
mod messages;

pub use client::{BRIDGE_PORT, DeviceIdentity, HttpTransport, Transport, derive_bridge_url};
pub use messages::{
    BridgeMessage, Capabilities, ConnectMessage, SpeakCommand, TranscriptionMessage, parse_speak,
};
