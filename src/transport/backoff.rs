//! Reconnect backoff policy.
//!
//! The delay before reconnect attempt `n + 1` is `min(base * 2^n, max_delay)`,
//! where `n` is the number of attempts already made since the last open.
//! After `max_attempts` attempts no further reconnect is scheduled.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound on any single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Reconnect attempts allowed per connection.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Exponential, capped reconnect policy with an attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay for the first attempt.
    pub base: Duration,
    /// Cap on every delay.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Returns the delay to wait when `attempts` reconnects were already made.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Returns `true` if another attempt may be scheduled.
    #[inline]
    #[must_use]
    pub const fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================
