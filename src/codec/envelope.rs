//! Protobuf wire envelope.
//!
//! Every binary-protocol frame is one [`Envelope`]. Outbound payloads
//! are JSON objects whose keys are normalized to the canonical camelCase
//! spelling before they are mapped onto the envelope; inbound envelopes
//! are decoded into [`DecodedEnvelope`] with the typed payload
//! interpreted and the raw payload kept alongside.

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;

use prost::Message;
use prost_types::Any;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::protocol::MessageCode;

use super::any::{DecodedPayload, any_from_json, decode_any, json_to_any};

// ============================================================================
// Constants
// ============================================================================

/// Legacy key spellings accepted on input, as `(canonical, legacy)`.
///
/// `payload` is the legacy spelling of `data`.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("requestId", "request_id"),
    ("clientIp", "client_ip"),
    ("userAgent", "user_agent"),
    ("deviceName", "device_name"),
    ("deviceType", "device_type"),
    ("data", "payload"),
];

// ============================================================================
// Envelope
// ============================================================================

/// The binary wire envelope.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// Status or message-kind code.
    #[prost(int32, tag = "1")]
    pub code: i32,

    /// Auth token.
    #[prost(string, tag = "2")]
    pub token: String,

    /// Free-form string metadata.
    #[prost(map = "string, string", tag = "3")]
    pub metadata: HashMap<String, String>,

    /// Human-readable message.
    #[prost(string, tag = "4")]
    pub message: String,

    /// Request correlation id.
    #[prost(string, tag = "5")]
    pub request_id: String,

    /// Milliseconds since the Unix epoch.
    #[prost(int64, tag = "6")]
    pub timestamp: i64,

    /// Client IP address.
    #[prost(string, tag = "7")]
    pub client_ip: String,

    /// Client user agent.
    #[prost(string, tag = "8")]
    pub user_agent: String,

    /// Device name.
    #[prost(string, tag = "9")]
    pub device_name: String,

    /// Device type.
    #[prost(string, tag = "10")]
    pub device_type: String,

    /// Opaque typed payload.
    #[prost(message, optional, tag = "11")]
    pub data: Option<Any>,
}

// ============================================================================
// EnvelopeFields
// ============================================================================

/// Outbound fields after key normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct EnvelopeFields {
    code: i32,
    token: String,
    metadata: HashMap<String, String>,
    message: String,
    request_id: String,
    timestamp: Option<i64>,
    client_ip: String,
    user_agent: String,
    device_name: String,
    device_type: String,
    data: Option<Value>,
}

impl EnvelopeFields {
    /// Reads fields from an arbitrary JSON value.
    ///
    /// Non-object values carry no fields. Null entries count as absent.
    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(object) => {
                serde_json::from_value(Value::Object(normalize_keys(object)))
                    .map_err(|e| Error::codec(format!("invalid envelope field: {e}")))
            }
            _ => Ok(Self::default()),
        }
    }

    fn into_envelope(self) -> Envelope {
        let data = self
            .data
            .map(|data| any_from_json(&data).unwrap_or_else(|| json_to_any(&data)));

        Envelope {
            code: self.code,
            token: self.token,
            metadata: self.metadata,
            message: self.message,
            request_id: self.request_id,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            device_name: self.device_name,
            device_type: self.device_type,
            data,
        }
    }
}

/// Maps legacy key spellings onto canonical ones and drops null entries.
///
/// The canonical spelling wins when both are present.
fn normalize_keys(object: &Map<String, Value>) -> Map<String, Value> {
    let mut normalized: Map<String, Value> = object
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (canonical, legacy) in LEGACY_KEYS {
        if let Some(value) = normalized.remove(*legacy)
            && !normalized.contains_key(*canonical)
        {
            normalized.insert((*canonical).to_owned(), value);
        }
    }

    normalized
}

// ============================================================================
// Encoding
// ============================================================================

/// Builds the envelope for an outbound JSON payload.
///
/// # Errors
///
/// Returns [`Error::Codec`] when a field has the wrong JSON type
/// (for example a string `code`).
pub fn envelope_from_json(value: &Value) -> Result<Envelope> {
    Ok(EnvelopeFields::from_json(value)?.into_envelope())
}

/// Encodes an outbound JSON payload as envelope bytes.
///
/// # Errors
///
/// See [`envelope_from_json`].
pub fn encode_envelope(value: &Value) -> Result<Vec<u8>> {
    Ok(envelope_from_json(value)?.encode_to_vec())
}

// ============================================================================
// RawAny
// ============================================================================

/// The embedded typed payload as it arrived, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAny {
    /// Type URL.
    pub type_url: String,
    /// Raw bytes.
    pub value: Vec<u8>,
}

impl From<Any> for RawAny {
    fn from(any: Any) -> Self {
        Self {
            type_url: any.type_url,
            value: any.value,
        }
    }
}

// ============================================================================
// DecodedEnvelope
// ============================================================================

/// An inbound envelope with its typed payload interpreted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEnvelope {
    /// Status or message-kind code.
    pub code: i32,
    /// Auth token.
    pub token: String,
    /// String metadata.
    pub metadata: HashMap<String, String>,
    /// Human-readable message.
    pub message: String,
    /// Request correlation id.
    pub request_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Client IP address.
    pub client_ip: String,
    /// Client user agent.
    pub user_agent: String,
    /// Device name.
    pub device_name: String,
    /// Device type.
    pub device_type: String,
    /// Interpreted payload.
    pub data: Option<DecodedPayload>,
    /// Payload before interpretation.
    #[serde(rename = "_rawPayload")]
    pub raw_payload: Option<RawAny>,
}

impl DecodedEnvelope {
    /// Classifies the envelope by its `code`.
    #[inline]
    #[must_use]
    pub fn message_code(&self) -> Option<MessageCode> {
        MessageCode::from_code(self.code)
    }
}

impl From<Envelope> for DecodedEnvelope {
    fn from(envelope: Envelope) -> Self {
        let data = envelope.data.as_ref().map(decode_any);

        Self {
            code: envelope.code,
            token: envelope.token,
            metadata: envelope.metadata,
            message: envelope.message,
            request_id: envelope.request_id,
            timestamp: envelope.timestamp,
            client_ip: envelope.client_ip,
            user_agent: envelope.user_agent,
            device_name: envelope.device_name,
            device_type: envelope.device_type,
            data,
            raw_payload: envelope.data.map(RawAny::from),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::codec::any::JSON_TYPE_URL;

    #[test]
    fn test_full_envelope_fields() {
        let envelope = envelope_from_json(&json!({
            "code": 1000,
            "token": "t-1",
            "metadata": { "trace": "abc" },
            "message": "hello",
            "requestId": "req-9",
            "timestamp": 1_700_000_000_000_i64,
            "clientIp": "10.0.0.1",
            "userAgent": "desktop",
            "deviceName": "laptop",
            "deviceType": "pc",
        }))
        .unwrap();

        assert_eq!(envelope.code, 1000);
        assert_eq!(envelope.token, "t-1");
        assert_eq!(envelope.metadata.get("trace").map(String::as_str), Some("abc"));
        assert_eq!(envelope.request_id, "req-9");
        assert_eq!(envelope.timestamp, 1_700_000_000_000);
        assert_eq!(envelope.client_ip, "10.0.0.1");
        assert_eq!(envelope.device_type, "pc");
        assert!(envelope.data.is_none());
    }

    #[test]
    fn test_legacy_spellings() {
        let envelope = envelope_from_json(&json!({
            "request_id": "r1",
            "client_ip": "1.2.3.4",
            "user_agent": "ua",
            "device_name": "dn",
            "device_type": "dt",
            "payload": { "x": 1 },
        }))
        .unwrap();

        assert_eq!(envelope.request_id, "r1");
        assert_eq!(envelope.client_ip, "1.2.3.4");
        assert_eq!(envelope.user_agent, "ua");
        assert_eq!(envelope.device_name, "dn");
        assert_eq!(envelope.device_type, "dt");
        assert_eq!(envelope.data.unwrap().type_url, JSON_TYPE_URL);
    }

    #[test]
    fn test_canonical_spelling_wins() {
        let envelope = envelope_from_json(&json!({
            "requestId": "canonical",
            "request_id": "legacy",
            "data": "primary",
            "payload": "secondary",
        }))
        .unwrap();

        assert_eq!(envelope.request_id, "canonical");
        assert_eq!(envelope.data.unwrap().value, br#""primary""#.to_vec());
    }

    #[test]
    fn test_defaults_and_timestamp() {
        let before = chrono::Utc::now().timestamp_millis();
        let envelope = envelope_from_json(&json!({ "code": null })).unwrap();
        let after = chrono::Utc::now().timestamp_millis();

        assert_eq!(envelope.code, 0);
        assert_eq!(envelope.token, "");
        assert!(envelope.metadata.is_empty());
        assert!(envelope.timestamp >= before && envelope.timestamp <= after);
    }

    #[test]
    fn test_non_object_payload_has_no_fields() {
        let envelope = envelope_from_json(&json!("ping")).unwrap();
        assert_eq!(envelope.code, 0);
        assert!(envelope.data.is_none());
        assert!(envelope.timestamp > 0);
    }

    #[test]
    fn test_typed_payload_used_verbatim() {
        let envelope = envelope_from_json(&json!({
            "data": { "typeUrl": "type.googleapis.com/im.Ack", "value": [8, 1] }
        }))
        .unwrap();

        let data = envelope.data.unwrap();
        assert_eq!(data.type_url, "type.googleapis.com/im.Ack");
        assert_eq!(data.value, vec![8, 1]);
    }

    #[test]
    fn test_wrong_field_type_is_an_error() {
        let err = envelope_from_json(&json!({ "code": "not-a-number" })).unwrap_err();
        assert!(matches!(err, Error::Codec { .. }));
        assert!(err.to_string().starts_with("Codec error: invalid envelope field"));
    }

    #[test]
    fn test_decoded_envelope_keeps_raw_payload() {
        let bytes = encode_envelope(&json!({
            "code": 1001,
            "data": { "groupId": "g1" },
        }))
        .unwrap();

        let decoded = DecodedEnvelope::from(Envelope::decode(bytes.as_slice()).unwrap());
        assert_eq!(decoded.message_code(), Some(MessageCode::GroupMessage));
        assert_eq!(
            decoded.data,
            Some(DecodedPayload::Json(json!({ "groupId": "g1" })))
        );

        let raw = decoded.raw_payload.as_ref().unwrap();
        assert_eq!(raw.type_url, JSON_TYPE_URL);
        assert_eq!(raw.value, br#"{"groupId":"g1"}"#.to_vec());
    }

    #[test]
    fn test_decoded_envelope_serializes_like_wire_object() {
        let decoded = DecodedEnvelope::from(Envelope {
            code: 0,
            request_id: "r".into(),
            timestamp: 5,
            ..Default::default()
        });

        let value = serde_json::to_value(&decoded).unwrap();
        assert_eq!(value["requestId"], json!("r"));
        assert_eq!(value["timestamp"], json!(5));
        assert_eq!(value["_rawPayload"], Value::Null);
    }
}
