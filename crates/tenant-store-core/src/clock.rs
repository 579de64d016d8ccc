// crates/tenant-store-core/src/clock.rs
// ============================================================================
// Module: Clocks
// Description: Monotonic time sources for the window tracker.
// Purpose: Allow deterministic window tests without sleeping.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The window tracker reads time through [`Clock`]. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`] forward explicitly.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock.
///
/// # Invariants
/// - Time never moves backwards.
#[derive(Debug)]
pub struct ManualClock {
    /// Instant the clock started at.
    base: Instant,
    /// Elapsed time in microseconds since `base`.
    offset_micros: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_micros: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward, saturating at the largest representable offset.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        let _ = self.offset_micros.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some(current.saturating_add(micros))
        });
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_micros.load(Ordering::SeqCst));
        self.base.checked_add(offset).unwrap_or(self.base)
    }
}
