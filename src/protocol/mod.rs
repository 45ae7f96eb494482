//! Worker command/event protocol.
//!
//! This module defines the message-passing contract between the
//! transport client (host) and the transport worker.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `WorkerCommand::Connect` | Host → Worker | Store config, open socket |
//! | `WorkerCommand::Send` | Host → Worker | Transmit one payload |
//! | `WorkerCommand::Disconnect` | Host → Worker | Close, no reconnect |
//! | `WorkerEvent::*` | Worker → Host | `open`, `message`, `error`, `close`, `log` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Commands, payloads and protocol modes |
//! | `event` | Events and log levels |
//! | `message_code` | Well-known envelope codes |

// ============================================================================
// Submodules
// ============================================================================

/// Host-to-worker commands.
pub mod command;

/// Worker-to-host events.
pub mod event;

/// Envelope code table.
pub mod message_code;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{ConnectCommand, Payload, Protocol, SendOptions, WorkerCommand};
pub use event::{LogLevel, WorkerEvent};
pub use message_code::MessageCode;
