//! Commands sent from the host to the transport worker.
//!
//! # Format
//!
//! ```json
//! { "type": "connect", "url": "wss://...", "payload": {...}, "heartbeat": "ping", "interval": 30000, "protocol": "proto" }
//! { "type": "send", "payload": {...}, "options": { "protocol": "json", "sendAsRawBytes": false } }
//! { "type": "disconnect" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Protocol
// ============================================================================

/// Wire protocol mode.
///
/// Requested as the WebSocket sub-protocol and used to pick the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Protobuf envelope in binary frames.
    #[default]
    Proto,
    /// JSON text frames.
    Json,
}

impl Protocol {
    /// Returns the sub-protocol token.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proto => "proto",
            Self::Json => "json",
        }
    }

    /// Picks the active protocol from the server-confirmed sub-protocol.
    ///
    /// A confirmed value containing `proto` or `json` (case-insensitive)
    /// wins; anything else falls back to `preferred`.
    #[must_use]
    pub fn negotiate(confirmed: Option<&str>, preferred: Self) -> Self {
        let confirmed = confirmed.unwrap_or_default().to_ascii_lowercase();
        if confirmed.contains("proto") {
            Self::Proto
        } else if confirmed.contains("json") {
            Self::Json
        } else {
            preferred
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payload
// ============================================================================

/// An application payload handed to the transport.
///
/// Byte buffers pass through every codec untouched; everything else is
/// a JSON value. On the command wire, bytes are written as
/// `{"$bytes": [..]}` so they survive a round trip; a plain JSON array
/// stays JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Pre-encoded bytes.
    Bytes(#[serde(with = "tagged_bytes")] Vec<u8>),
    /// Any JSON-serializable value.
    Json(Value),
}

mod tagged_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged<T> {
        #[serde(rename = "$bytes")]
        bytes: T,
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Tagged { bytes }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Tagged::<Vec<u8>>::deserialize(deserializer).map(|tagged| tagged.bytes)
    }
}

impl Payload {
    /// Serializes any value into a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if the value cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Returns the JSON value, if this is not a byte payload.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Bytes(_) => None,
        }
    }

    /// Returns `true` for pre-encoded bytes.
    #[inline]
    #[must_use]
    pub fn is_bytes(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Json(Value::String(text.to_owned()))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Json(Value::String(text))
    }
}

// ============================================================================
// ConnectCommand
// ============================================================================

/// Parameters of a `connect` command.
///
/// Absent fields take the worker defaults (heartbeat `"ping"`,
/// interval 30000 ms, protocol `proto`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectCommand {
    /// Target WebSocket URL.
    pub url: String,

    /// Sent once, right after every successful open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,

    /// Sent on every heartbeat tick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<Payload>,

    /// Heartbeat period in milliseconds; 0 disables the heartbeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,

    /// Preferred protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

// ============================================================================
// SendOptions
// ============================================================================

/// Per-message overrides for a `send` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    /// Encode with this protocol instead of the negotiated one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    /// Skip the envelope codec entirely.
    #[serde(default)]
    pub send_as_raw_bytes: bool,
}

impl SendOptions {
    /// Options that bypass the codec.
    #[inline]
    #[must_use]
    pub const fn raw() -> Self {
        Self {
            protocol: None,
            send_as_raw_bytes: true,
        }
    }

    /// Options that force a protocol for one message.
    #[inline]
    #[must_use]
    pub const fn with_protocol(protocol: Protocol) -> Self {
        Self {
            protocol: Some(protocol),
            send_as_raw_bytes: false,
        }
    }
}

// ============================================================================
// WorkerCommand
// ============================================================================

/// A command from the host to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerCommand {
    /// Store the config and open a socket.
    Connect(ConnectCommand),

    /// Encode and transmit a payload on the open socket.
    Send {
        /// Payload to transmit.
        payload: Payload,
        /// Optional overrides.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<SendOptions>,
    },

    /// Close the socket and suppress reconnection.
    Disconnect,
}

impl WorkerCommand {
    /// Creates a plain `send` command.
    #[inline]
    #[must_use]
    pub fn send(payload: impl Into<Payload>) -> Self {
        Self::Send {
            payload: payload.into(),
            options: None,
        }
    }

    /// Returns the command tag as it appears on the wire.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Send { .. } => "send",
            Self::Disconnect => "disconnect",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
