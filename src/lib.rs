//! IM transport - real-time WebSocket transport core for a desktop IM client.
//!
//! This library keeps one long-lived WebSocket connection to the IM
//! server and shares it between any number of consumers.
//!
//! # Architecture
//!
//! The transport is split in two halves that only talk through messages:
//!
//! - **Transport Worker**: a tokio task that owns the socket, negotiates
//!   `proto`/`json`, sends the heartbeat and reconnects with backoff
//! - **Transport Client**: the host-side mediator that creates the worker
//!   lazily, buffers sends, fans out inbound messages and restarts a
//!   faulted worker
//!
//! Key design principles:
//!
//! - The worker never blocks the host; every failure becomes an event
//! - Host operations return immediately; progress is observed via state
//! - Protobuf envelopes carry `google.protobuf.Any` bodies, decoded to JSON
//!
//! # Quick Start
//!
//! ```no_run
//! use im_transport::{ClientOptions, ConnectionConfig, Result, TransportClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = TransportClient::tungstenite(ClientOptions::default())?;
//!
//!     let _subscription = client.subscribe(|message| {
//!         println!("code {:?}: {message:?}", message.code());
//!     });
//!
//!     let config = ConnectionConfig::new("wss://im.example/ws")
//!         .with_query([("uid", "u1"), ("token", "secret")])?
//!         .with_payload(json!({ "code": 100, "data": { "uid": "u1" } }));
//!     client.connect(config);
//!
//!     let mut state = client.state();
//!     state.wait_for(|state| state.is_open()).await.ok();
//!
//!     client.send(json!({ "code": 1000, "data": { "text": "hello" } }));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`TransportClient`], subscriptions and observable state |
//! | [`codec`] | Frame encoding and decoding for both protocols |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Worker commands, events and message codes |
//! | [`transport`] | Socket seam, backoff and the transport worker |

// ============================================================================
// Modules
// ============================================================================

/// Host-side transport client.
///
/// Use [`TransportClient::tungstenite`] to create a client that opens
/// real WebSocket connections.
pub mod client;

/// Wire codec.
///
/// Converts payloads to frames and frames to [`Inbound`] messages.
pub mod codec;

/// Error types and result aliases.
///
/// Fallible constructors and codec calls return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Worker command/event protocol.
pub mod protocol;

/// WebSocket transport layer.
///
/// Connection configuration, reconnect policy and the transport worker.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    ClientDiagnostics, ClientOptions, ConnectionState, ConnectionStatus, MessageHistory,
    Subscription, TransportClient,
};

// Codec types
pub use codec::{DecodedEnvelope, Envelope, Frame, Inbound};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{SubscriptionId, WorkerGeneration};

// Protocol types
pub use protocol::{
    ConnectCommand, LogLevel, MessageCode, Payload, Protocol, SendOptions, WorkerCommand,
    WorkerEvent,
};

// Transport types
pub use transport::{
    ConnectionConfig, Connector, ReconnectPolicy, Socket, SocketEvent, SocketWorkerFactory,
    TransportWorker, TungsteniteConnector, WorkerFactory, WorkerHandle,
};
