//! Outbound buffer for sends issued while not open.
//!
//! The buffer is bounded and rejects the newest payload once full;
//! buffered payloads are never evicted.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::protocol::Payload;

// ============================================================================
// OutboundBuffer
// ============================================================================

/// FIFO of payloads awaiting an open connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundBuffer {
    items: VecDeque<Payload>,
    capacity: usize,
}

impl OutboundBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Queues a payload.
    ///
    /// # Errors
    ///
    /// Hands the payload back when the buffer is full.
    pub fn push(&mut self, payload: Payload) -> Result<(), Payload> {
        if self.is_full() {
            return Err(payload);
        }
        self.items.push_back(payload);
        Ok(())
    }

    /// Removes and returns every payload in submission order.
    pub fn drain(&mut self) -> Vec<Payload> {
        self.items.drain(..).collect()
    }

    /// Drops every payload.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of queued payloads.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns `true` if the next push will be rejected.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Maximum number of queued payloads.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================
