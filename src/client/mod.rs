//! Host-side transport client.
//!
//! The client mediates between consumers and the transport worker: it
//! owns the worker lifecycle, buffers outbound sends while the socket is
//! not open, and publishes an observable [`ConnectionState`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `buffer` | Bounded outbound buffer |
//! | `core` | [`TransportClient`] and [`Subscription`] |
//! | `options` | Capacities and lifecycle delays |
//! | `state` | Observable status and message history |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound buffer.
pub mod buffer;

/// Transport client mediator.
pub mod core;

/// Client options.
pub mod options;

/// Observable connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use buffer::OutboundBuffer;
pub use core::{ClientDiagnostics, MessageHandler, Subscription, TransportClient};
pub use options::ClientOptions;
pub use state::{ConnectionState, ConnectionStatus, MessageHistory};
