//! Typed payload (`google.protobuf.Any`) interpretation.
//!
//! The type URL of an embedded payload selects one of a closed set of
//! decoders. Each decoder falls back to JSON text and finally to the raw
//! bytes, so interpretation never fails.

// ============================================================================
// Imports
// ============================================================================

use prost::Message;
use prost_types::value::Kind;
use prost_types::{Any, ListValue, Struct, Value as ProtoValue};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Type URL for payloads wrapped as UTF-8 JSON text.
pub const JSON_TYPE_URL: &str = "type.googleapis.com/json";

// ============================================================================
// AnyKind
// ============================================================================

/// Known payload kinds, selected by the last segment of the type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyKind {
    /// `google.protobuf.Struct`.
    Struct,
    /// `google.protobuf.Value`.
    Value,
    /// `google.protobuf.ListValue`.
    ListValue,
    /// UTF-8 JSON text.
    Json,
    /// Anything else.
    Unknown,
}

impl AnyKind {
    /// Classifies a type URL such as `type.googleapis.com/google.protobuf.Struct`.
    #[must_use]
    pub fn from_type_url(type_url: &str) -> Self {
        let type_name = type_url.rsplit('/').next().unwrap_or(type_url);
        let short_name = type_name.rsplit('.').next().unwrap_or(type_name);

        match short_name {
            "Struct" => Self::Struct,
            "Value" => Self::Value,
            "ListValue" => Self::ListValue,
            "json" | "JSON" => Self::Json,
            _ => Self::Unknown,
        }
    }
}

// ============================================================================
// DecodedPayload
// ============================================================================

/// The interpreted form of an embedded typed payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedPayload {
    /// A `Struct`, as a JSON object.
    Struct(Map<String, Value>),
    /// A `Value`, scalar or nested.
    Value(Value),
    /// A `ListValue`, as a JSON array.
    List(Vec<Value>),
    /// JSON text, parsed.
    Json(Value),
    /// Bytes no decoder accepted.
    Opaque(Vec<u8>),
}

impl DecodedPayload {
    /// Returns the payload as JSON, or `None` for opaque bytes.
    #[must_use]
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Struct(map) => Some(Value::Object(map.clone())),
            Self::Value(value) | Self::Json(value) => Some(value.clone()),
            Self::List(items) => Some(Value::Array(items.clone())),
            Self::Opaque(_) => None,
        }
    }
}

// ============================================================================
// Interpretation
// ============================================================================

/// Interprets a typed payload according to its type URL.
#[must_use]
pub fn decode_any(any: &Any) -> DecodedPayload {
    let kind = AnyKind::from_type_url(&any.type_url);
    let raw = any.value.as_slice();

    let structured = match kind {
        AnyKind::Struct => Struct::decode(raw)
            .map(|s| DecodedPayload::Struct(struct_to_json(s)))
            .ok(),
        AnyKind::Value => ProtoValue::decode(raw)
            .map(|v| DecodedPayload::Value(value_to_json(v)))
            .ok(),
        AnyKind::ListValue => ListValue::decode(raw)
            .map(|l| DecodedPayload::List(list_to_json(l)))
            .ok(),
        AnyKind::Json | AnyKind::Unknown => None,
    };

    if let Some(decoded) = structured {
        return decoded;
    }

    if let Ok(text) = std::str::from_utf8(raw)
        && (kind == AnyKind::Json || looks_like_json(text))
        && let Ok(value) = serde_json::from_str(text)
    {
        return DecodedPayload::Json(value);
    }

    trace!(type_url = %any.type_url, len = raw.len(), "Keeping typed payload as bytes");
    DecodedPayload::Opaque(any.value.clone())
}

/// Wraps a JSON value as a JSON-typed payload.
#[must_use]
pub fn json_to_any(value: &Value) -> Any {
    Any {
        type_url: JSON_TYPE_URL.to_owned(),
        value: value.to_string().into_bytes(),
    }
}

/// Recognizes a value that already carries a typed payload.
///
/// Accepts `{ "typeUrl" | "type_url": string, "value": [u8, ...] }`.
#[must_use]
pub fn any_from_json(value: &Value) -> Option<Any> {
    let object = value.as_object()?;
    let type_url = object
        .get("typeUrl")
        .or_else(|| object.get("type_url"))?
        .as_str()?;

    let bytes = object
        .get("value")?
        .as_array()?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()?;

    Some(Any {
        type_url: type_url.to_owned(),
        value: bytes,
    })
}

fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"')
}

fn struct_to_json(s: Struct) -> Map<String, Value> {
    s.fields
        .into_iter()
        .map(|(key, value)| (key, value_to_json(value)))
        .collect()
}

fn list_to_json(list: ListValue) -> Vec<Value> {
    list.values.into_iter().map(value_to_json).collect()
}

fn value_to_json(value: ProtoValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::NumberValue(n)) => Number::from_f64(n).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::StructValue(s)) => Value::Object(struct_to_json(s)),
        Some(Kind::ListValue(l)) => Value::Array(list_to_json(l)),
    }
}

// ============================================================================
// Tests
// ============================================================================
