//! Capped exponential backoff over every code below
//! [`ErrorCode::FATAL_ERROR`](routing_core::ErrorCode::FATAL_ERROR).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use routing_core::{ErrorCode, RetryPolicy};

/// Retries any code below the fatal threshold, with delay capped at ten
/// seconds and doubling on every attempt after the first:
/// `delay = min(10, base * 2^min(20, attempt - 1))`.
///
/// `base_delay` and `enabled` are runtime-tunable and stored in relaxed
/// atomics rather than behind a lock: a config update racing an in-flight
/// `delay`/`can_retry` call producing a stale read for one call is
/// tolerable, so there is nothing to gain from serializing the two.
pub struct RetryTransientErrorsPolicy {
    base_delay_bits: AtomicU64,
    enabled: AtomicBool,
}

impl RetryTransientErrorsPolicy {
    /// A one-second base delay, enabled by default.
    #[must_use]
    pub fn new() -> Self {
        Self { base_delay_bits: AtomicU64::new(1.0_f64.to_bits()), enabled: AtomicBool::new(true) }
    }

    #[must_use]
    pub fn base_delay(&self) -> f64 {
        f64::from_bits(self.base_delay_bits.load(Ordering::Relaxed))
    }

    pub fn set_base_delay(&self, seconds: f64) {
        self.base_delay_bits.store(seconds.to_bits(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for RetryTransientErrorsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy for RetryTransientErrorsPolicy {
    fn can_retry(&self, code: ErrorCode) -> bool {
        self.enabled() && !code.is_fatal()
    }

    fn delay(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(20);
        let backoff = self.base_delay() * 2f64.powi(exponent as i32);
        backoff.min(10.0)
    }
}
