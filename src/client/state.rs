//! Observable connection state.
//!
//! The client owns the only writable copy; consumers read it through a
//! `watch` receiver.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::collections::vec_deque::Iter;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::codec::Inbound;

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Coarse connection status as seen by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Never connected.
    #[default]
    Idle,
    /// A `connect` was issued and no `open` has arrived yet.
    Connecting,
    /// The worker reported `open`.
    Open,
    /// Disconnected, or the worker was released.
    Closed,
    /// The worker reported an `error`.
    Error,
}

impl ConnectionStatus {
    /// Returns the lowercase status name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// MessageHistory
// ============================================================================

/// Bounded FIFO of the most recent inbound messages.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHistory {
    items: VecDeque<Inbound>,
    capacity: usize,
}

impl MessageHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a message, returning the evicted oldest one if full.
    pub fn push(&mut self, message: Inbound) -> Option<Inbound> {
        if self.capacity == 0 {
            return Some(message);
        }

        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(message);
        evicted
    }

    /// Number of stored messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of stored messages.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iterator.
    pub fn iter(&self) -> Iter<'_, Inbound> {
        self.items.iter()
    }

    /// Oldest stored message.
    #[must_use]
    pub fn front(&self) -> Option<&Inbound> {
        self.items.front()
    }

    /// Newest stored message.
    #[must_use]
    pub fn back(&self) -> Option<&Inbound> {
        self.items.back()
    }

    /// Removes every message.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a> IntoIterator for &'a MessageHistory {
    type Item = &'a Inbound;
    type IntoIter = Iter<'a, Inbound>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for MessageHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.items)
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Snapshot of the client's view of the connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    /// `true` between `open` and the next `close`/disconnect.
    pub connected: bool,
    /// Current status.
    pub status: ConnectionStatus,
    /// Most recent inbound message.
    pub last_message: Option<Inbound>,
    /// Recent inbound messages, oldest first.
    pub messages: MessageHistory,
    /// Last reported error.
    pub error: Option<String>,
}

impl ConnectionState {
    /// Creates the initial `idle` state.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            connected: false,
            status: ConnectionStatus::Idle,
            last_message: None,
            messages: MessageHistory::new(history_capacity),
            error: None,
        }
    }

    /// Returns `true` when the status is `open`.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == ConnectionStatus::Open
    }

    /// Records an inbound message as the latest and appends it to history.
    pub(crate) fn record(&mut self, message: &Inbound) {
        self.last_message = Some(message.clone());
        self.messages.push(message.clone());
    }
}

// ============================================================================
// Tests
// ============================================================================
