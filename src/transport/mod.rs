//! WebSocket transport layer.
//!
//! The transport worker owns one physical connection and keeps it alive
//! without host involvement.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   WorkerCommand    ┌──────────────────┐
//! │ TransportClient  │───────────────────►│ TransportWorker  │    WebSocket
//! │  (host side)     │◄───────────────────│  (tokio task)    │◄──────────────► server
//! └──────────────────┘    WorkerEvent     └──────────────────┘  proto | json
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay and attempt limit |
//! | `config` | Per-connect configuration and URL validation |
//! | `socket` | `Connector`/`Socket` seams and the tungstenite implementation |
//! | `worker` | The worker actor, its handle and factory |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff policy.
pub mod backoff;

/// Connection configuration.
pub mod config;

/// Physical socket seam.
pub mod socket;

/// Transport worker actor.
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectPolicy;
pub use config::ConnectionConfig;
pub use socket::{Connector, Socket, SocketEvent, TungsteniteConnector};
pub use worker::{SocketWorkerFactory, TransportWorker, WorkerFactory, WorkerHandle};
