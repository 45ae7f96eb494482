//! Physical socket seam.
//!
//! The worker talks to the network only through [`Connector`] and
//! [`Socket`]. The production implementation is tokio-tungstenite;
//! tests substitute in-memory sockets.
//!
//! # Event Semantics
//!
//! | Wire condition | [`SocketEvent`] sequence |
//! |----------------|--------------------------|
//! | Text/binary frame | `Frame` |
//! | Close frame | `Closed { code, reason }` (1005 if no code) |
//! | Stream error | `Error`, then `Closed { 1006 }` |
//! | Stream ended | `Closed { 1006 }` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};

use crate::codec::Frame;
use crate::error::{Error, Result};
use crate::protocol::Protocol;

use super::config::parse_endpoint;

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Time allowed for the closing handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// SocketEvent
// ============================================================================

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A data frame arrived.
    Frame(Frame),
    /// The socket failed. A `Closed` event follows.
    Error(String),
    /// The socket is closed.
    Closed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

// ============================================================================
// Traits
// ============================================================================

/// An open WebSocket connection.
#[async_trait]
pub trait Socket: Send {
    /// Sub-protocol confirmed by the server, if any.
    fn protocol(&self) -> Option<&str>;

    /// Returns `true` until a close or error has been observed.
    fn is_open(&self) -> bool;

    /// Sends one frame.
    async fn send(&mut self, frame: Frame) -> Result<()>;

    /// Waits for the next event. Must be cancel-safe.
    async fn next_event(&mut self) -> SocketEvent;

    /// Closes the socket. Produces no further events.
    async fn close(&mut self);
}

/// Opens sockets.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a socket to `url`, requesting `protocol` as the sub-protocol.
    async fn connect(&self, url: &str, protocol: Protocol) -> Result<Box<dyn Socket>>;
}

// ============================================================================
// TungsteniteConnector
// ============================================================================

/// Connector backed by tokio-tungstenite (`ws://` and `wss://`).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, protocol: Protocol) -> Result<Box<dyn Socket>> {
        let endpoint = parse_endpoint(url)?;

        let mut request = endpoint.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol.as_str()));

        let (stream, response) = connect_async(request)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        let negotiated = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        debug!(url = %endpoint, requested = %protocol, ?negotiated, "WebSocket handshake completed");

        Ok(Box::new(TungsteniteSocket::new(stream, negotiated)))
    }
}

// ============================================================================
// TungsteniteSocket
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Open,
    Failed,
    Closed,
}

/// A tokio-tungstenite client connection.
pub struct TungsteniteSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    protocol: Option<String>,
    state: SocketState,
}

impl TungsteniteSocket {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>, protocol: Option<String>) -> Self {
        Self {
            stream,
            protocol,
            state: SocketState::Open,
        }
    }
}

#[async_trait]
impl Socket for TungsteniteSocket {
    fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    fn is_open(&self) -> bool {
        self.state == SocketState::Open
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        if self.state != SocketState::Open {
            return Err(Error::ConnectionClosed);
        }

        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.stream.send(message).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> SocketEvent {
        loop {
            match self.state {
                SocketState::Open => {}
                SocketState::Failed => {
                    self.state = SocketState::Closed;
                    return SocketEvent::Closed {
                        code: Some(CLOSE_ABNORMAL),
                        reason: String::new(),
                    };
                }
                SocketState::Closed => return std::future::pending().await,
            }

            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return SocketEvent::Frame(Frame::Text(text.as_str().to_owned()));
                }

                Some(Ok(Message::Binary(bytes))) => {
                    return SocketEvent::Frame(Frame::Binary(bytes.to_vec()));
                }

                Some(Ok(Message::Close(frame))) => {
                    self.state = SocketState::Closed;
                    let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                    return SocketEvent::Closed {
                        code: Some(code),
                        reason,
                    };
                }

                // Ping/pong are answered by tungstenite.
                Some(Ok(other)) => {
                    trace!(kind = ?other, "Ignoring control frame");
                }

                Some(Err(e)) => {
                    self.state = SocketState::Failed;
                    return SocketEvent::Error(e.to_string());
                }

                None => {
                    self.state = SocketState::Closed;
                    return SocketEvent::Closed {
                        code: Some(CLOSE_ABNORMAL),
                        reason: String::new(),
                    };
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.state == SocketState::Open
            && timeout(CLOSE_TIMEOUT, self.stream.close(None)).await.is_err()
        {
            debug!("Closing handshake timed out");
        }
        self.state = SocketState::Closed;
    }
}

// ============================================================================
// Tests
// ============================================================================
