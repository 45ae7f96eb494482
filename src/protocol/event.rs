//! Events emitted by the transport worker to its host.
//!
//! # Format
//!
//! ```json
//! { "event": "open" }
//! { "event": "message", "data": ... }
//! { "event": "error", "error": "WebSocket connection error" }
//! { "event": "close", "code": 1006, "reason": "" }
//! { "event": "log", "level": "warn", "msg": ["Cannot send: WebSocket not open"] }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::Inbound;

// ============================================================================
// LogLevel
// ============================================================================

/// Severity of a worker `log` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose diagnostics.
    Debug,
    /// Lifecycle milestones.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures.
    Error,
}

// ============================================================================
// WorkerEvent
// ============================================================================

/// An event from the worker to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum WorkerEvent {
    /// Socket opened and the initial payload (if any) was sent.
    Open,

    /// A decoded inbound frame.
    Message {
        /// Decoded content.
        data: Inbound,
    },

    /// Socket-level error.
    Error {
        /// Human-readable description.
        error: String,
    },

    /// Socket closed, for any reason.
    Close {
        /// WebSocket close code.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        /// Close reason.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Diagnostic output for the host's logging sink.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message parts.
        msg: Vec<Value>,
    },
}

impl WorkerEvent {
    /// Creates a single-part log event.
    #[inline]
    #[must_use]
    pub fn log(level: LogLevel, msg: impl Into<String>) -> Self {
        Self::Log {
            level,
            msg: vec![Value::String(msg.into())],
        }
    }

    /// Returns the event tag as it appears on the wire.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message { .. } => "message",
            Self::Error { .. } => "error",
            Self::Close { .. } => "close",
            Self::Log { .. } => "log",
        }
    }

    /// Joins the parts of a `log` event into one line.
    ///
    /// Returns `None` for other events.
    #[must_use]
    pub fn log_line(&self) -> Option<String> {
        let Self::Log { msg, .. } = self else {
            return None;
        };

        let parts: Vec<String> = msg
            .iter()
            .map(|part| match part {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect();

        Some(parts.join(" "))
    }
}

// ============================================================================
// Tests
// ============================================================================
