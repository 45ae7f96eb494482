//! Transport client options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use im_transport::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_buffer_capacity(500)
//!     .with_idle_release(Duration::from_secs(60));
//!
//! assert_eq!(options.history_capacity, 200);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Outbound messages held while disconnected.
pub const DEFAULT_BUFFER_CAPACITY: usize = 2000;

/// Inbound messages kept in the state history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Delay between the last unsubscribe and worker release.
pub const DEFAULT_IDLE_RELEASE: Duration = Duration::from_secs(30);

/// Delay before reconnecting after a worker fault.
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(5);

// ============================================================================
// ClientOptions
// ============================================================================

/// Capacities and lifecycle delays of a [`crate::TransportClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Outbound buffer capacity. Sends beyond it are dropped.
    pub buffer_capacity: usize,

    /// Inbound history capacity. The oldest entry is evicted first.
    pub history_capacity: usize,

    /// Idle time after the last unsubscribe before the worker is released.
    pub idle_release: Duration,

    /// Delay before a faulted worker is restarted.
    pub restart_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with the default capacities and delays.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            idle_release: DEFAULT_IDLE_RELEASE,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the outbound buffer capacity.
    #[inline]
    #[must_use]
    pub const fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    /// Sets the inbound history capacity.
    #[inline]
    #[must_use]
    pub const fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Sets the idle release delay.
    #[inline]
    #[must_use]
    pub const fn with_idle_release(mut self, delay: Duration) -> Self {
        self.idle_release = delay;
        self
    }

    /// Sets the crash restart delay.
    #[inline]
    #[must_use]
    pub const fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
