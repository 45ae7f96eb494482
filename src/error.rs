//! Error types for the IM transport core.
//!
//! Errors in this crate stay on one side of the Worker/Client boundary.
//! The worker turns every failure into `log`/`error` events; the client
//! exposes non-blocking operations that never return errors. The
//! [`Result`] alias is used by construction, configuration, the socket
//! seam and the codec.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::InvalidUrl`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Codec | [`Error::Codec`], [`Error::Json`] |
//! | Runtime | [`Error::Runtime`], [`Error::WorkerUnavailable`] |
//! | External | [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Connection URL could not be used.
    ///
    /// Returned when the URL does not parse or is not `ws`/`wss`.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket handshake failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Socket is closed or failed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// Payload could not be mapped onto the wire envelope.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// No async runtime available.
    #[error("Runtime error: {message}")]
    Runtime {
        /// Description of the runtime problem.
        message: String,
    },

    /// Worker task is gone (terminated or crashed).
    #[error("Transport worker unavailable")]
    WorkerUnavailable,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// WebSocket protocol or transmission error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a runtime error.
    #[inline]
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
