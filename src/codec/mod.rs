//! Wire codec.
//!
//! Translates between application payloads and WebSocket frames for
//! both protocol modes.
//!
//! | Direction | `proto` | `json` |
//! |-----------|---------|--------|
//! | Encode | envelope bytes (byte payloads pass through) | JSON text |
//! | Decode | envelope, else UTF-8 text, else raw bytes | JSON, else raw text |
//!
//! Decoding never fails: each step degrades to a less structured
//! [`Inbound`] variant.

// ============================================================================
// Submodules
// ============================================================================

/// Typed payload interpretation.
pub mod any;

/// Protobuf envelope.
pub mod envelope;

// ============================================================================
// Imports
// ============================================================================

use prost::Message;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::{Payload, Protocol};

pub use any::{AnyKind, DecodedPayload, JSON_TYPE_URL};
pub use envelope::{DecodedEnvelope, Envelope, RawAny};

// ============================================================================
// Frame
// ============================================================================

/// One WebSocket data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Frame {
    /// Returns the frame length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` for an empty frame.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// A decoded inbound frame, from most to least structured.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Inbound {
    /// A binary envelope.
    Envelope(Box<DecodedEnvelope>),
    /// JSON text.
    Json(Value),
    /// Text that is not JSON.
    Text(String),
    /// Binary data that is neither an envelope nor UTF-8.
    Bytes(Vec<u8>),
}

impl Inbound {
    /// Returns the envelope, if this frame was one.
    #[inline]
    #[must_use]
    pub fn as_envelope(&self) -> Option<&DecodedEnvelope> {
        match self {
            Self::Envelope(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Returns the JSON value, if this frame was JSON.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the `code` of an envelope or of a JSON object frame.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Envelope(envelope) => Some(i64::from(envelope.code)),
            Self::Json(value) => value.get("code").and_then(Value::as_i64),
            Self::Text(_) | Self::Bytes(_) => None,
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a payload for the given protocol.
///
/// Byte payloads become binary frames in both modes; `json` mode does not
/// stringify them.
///
/// # Errors
///
/// Returns a codec error if a JSON payload cannot be mapped onto the
/// envelope.
pub fn encode(payload: &Payload, protocol: Protocol) -> Result<Frame> {
    match (payload, protocol) {
        (Payload::Bytes(bytes), _) => Ok(Frame::Binary(bytes.clone())),
        (Payload::Json(value), Protocol::Json) => Ok(Frame::Text(value.to_string())),
        (Payload::Json(value), Protocol::Proto) => {
            Ok(Frame::Binary(envelope::encode_envelope(value)?))
        }
    }
}

/// Encodes a payload without the envelope.
///
/// Strings go out as-is, bytes as binary, everything else as JSON text.
#[must_use]
pub fn encode_raw(payload: &Payload) -> Frame {
    match payload {
        Payload::Bytes(bytes) => Frame::Binary(bytes.clone()),
        Payload::Json(Value::String(text)) => Frame::Text(text.clone()),
        Payload::Json(value) => Frame::Text(value.to_string()),
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes an inbound frame.
#[must_use]
pub fn decode(frame: Frame) -> Inbound {
    match frame {
        Frame::Text(text) => decode_text(text),
        Frame::Binary(bytes) => match Envelope::decode(bytes.as_slice()) {
            Ok(envelope) => Inbound::Envelope(Box::new(envelope.into())),
            Err(_) => match String::from_utf8(bytes) {
                Ok(text) => decode_text(text),
                Err(err) => Inbound::Bytes(err.into_bytes()),
            },
        },
    }
}

fn decode_text(text: String) -> Inbound {
    match serde_json::from_str(&text) {
        Ok(value) => Inbound::Json(value),
        Err(_) => Inbound::Text(text),
    }
}

// ============================================================================
// Tests
// ============================================================================
