//! Connection configuration.
//!
//! A [`ConnectionConfig`] is built once per `connect` call and replaces
//! the previous one. The worker keeps it for every reconnect attempt
//! until an explicit disconnect.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use im_transport::{ConnectionConfig, Protocol};
//! use serde_json::json;
//!
//! let config = ConnectionConfig::new("wss://im.example/ws")
//!     .with_query([("uid", "u1"), ("token", "t")])?
//!     .with_payload(json!({ "code": 100 }))
//!     .with_interval(Duration::from_secs(10))
//!     .with_protocol(Protocol::Json);
//!
//! assert_eq!(config.url, "wss://im.example/ws?uid=u1&token=t");
//! # Ok::<(), im_transport::Error>(())
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{ConnectCommand, Payload, Protocol};

// ============================================================================
// Constants
// ============================================================================

/// Heartbeat payload used when none is configured.
pub const DEFAULT_HEARTBEAT: &str = "ping";

/// Heartbeat period used when none is configured.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Parameters for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Target WebSocket URL.
    pub url: String,

    /// Sent once after every successful open, before the heartbeat starts.
    pub payload: Option<Payload>,

    /// Sent on every heartbeat tick.
    pub heartbeat: Payload,

    /// Heartbeat period. Zero disables the heartbeat.
    pub interval: Duration,

    /// Preferred protocol, requested as the sub-protocol.
    pub protocol: Protocol,
}

impl ConnectionConfig {
    /// Creates a config with default heartbeat, interval and protocol.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            payload: None,
            heartbeat: Payload::from(DEFAULT_HEARTBEAT),
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            protocol: Protocol::default(),
        }
    }

    /// Sets the payload sent right after open.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Sets the heartbeat payload.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: impl Into<Payload>) -> Self {
        self.heartbeat = heartbeat.into();
        self
    }

    /// Sets the heartbeat period.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the preferred protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Appends query parameters to the URL (for example `uid` and `token`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL does not parse.
    pub fn with_query<I, K, V>(mut self, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = Url::parse(&self.url)
            .map_err(|e| Error::invalid_url(self.url.clone(), e.to_string()))?;
        url.query_pairs_mut().extend_pairs(pairs);
        self.url = url.into();
        Ok(self)
    }

    /// Validates the URL and returns it parsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] unless the URL parses with a `ws` or
    /// `wss` scheme.
    pub fn endpoint(&self) -> Result<Url> {
        parse_endpoint(&self.url)
    }

    /// Returns the heartbeat period, or `None` when disabled.
    #[inline]
    #[must_use]
    pub fn heartbeat_period(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then_some(self.interval)
    }

    /// Builds the `connect` command for the worker.
    #[must_use]
    pub fn to_command(&self) -> ConnectCommand {
        ConnectCommand {
            url: self.url.clone(),
            payload: self.payload.clone(),
            heartbeat: Some(self.heartbeat.clone()),
            interval: Some(u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX)),
            protocol: Some(self.protocol),
        }
    }
}

impl From<ConnectCommand> for ConnectionConfig {
    fn from(command: ConnectCommand) -> Self {
        Self {
            url: command.url,
            payload: command.payload,
            heartbeat: command
                .heartbeat
                .unwrap_or_else(|| Payload::from(DEFAULT_HEARTBEAT)),
            interval: command
                .interval
                .map_or(DEFAULT_HEARTBEAT_INTERVAL, Duration::from_millis),
            protocol: command.protocol.unwrap_or_default(),
        }
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Parses a WebSocket URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the URL does not parse or its scheme
/// is not `ws`/`wss`.
pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::invalid_url(raw, e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::invalid_url(
            raw,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("ws://localhost:9000/im");
        assert_eq!(config.heartbeat, Payload::from("ping"));
        assert_eq!(config.interval, Duration::from_millis(30_000));
        assert_eq!(config.protocol, Protocol::Proto);
        assert!(config.payload.is_none());
    }

    #[test]
    fn test_zero_interval_disables_heartbeat() {
        let config = ConnectionConfig::new("ws://h").with_interval(Duration::ZERO);
        assert_eq!(config.heartbeat_period(), None);

        let config = config.with_interval(Duration::from_secs(1));
        assert_eq!(config.heartbeat_period(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_with_query_encodes_values() {
        let config = ConnectionConfig::new("wss://im.example/ws")
            .with_query([("uid", "a b"), ("token", "x&y")])
            .unwrap();
        assert_eq!(config.url, "wss://im.example/ws?uid=a+b&token=x%26y");
    }

    #[test]
    fn test_endpoint_validation() {
        assert!(ConnectionConfig::new("wss://im.example/ws").endpoint().is_ok());

        let err = ConnectionConfig::new("https://im.example").endpoint().unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));

        let err = parse_endpoint("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_command_conversion() {
        let config = ConnectionConfig::new("ws://h")
            .with_payload(json!({ "hello": 1 }))
            .with_interval(Duration::from_millis(1000));

        let command = config.to_command();
        assert_eq!(command.interval, Some(1000));
        assert_eq!(command.protocol, Some(Protocol::Proto));
        assert_eq!(ConnectionConfig::from(command), config);
    }

    #[test]
    fn test_command_defaults_fill_in() {
        let config = ConnectionConfig::from(ConnectCommand {
            url: "ws://h".into(),
            payload: None,
            heartbeat: None,
            interval: None,
            protocol: None,
        });
        assert_eq!(config, ConnectionConfig::new("ws://h"));
    }
}
