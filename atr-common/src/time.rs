//! Timestamp utilities
//!
//! Wire timestamps are Unix seconds as `f64` with a fractional part.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of "now" for timestamp defaults
pub trait Clock: Send + Sync {
    /// Current time as fractional Unix seconds
    fn now_unix(&self) -> f64;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> f64 {
        to_unix_seconds(Utc::now())
    }
}

/// Clock pinned to a settable instant.
///
/// Used wherever deterministic timestamps are needed.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(now_unix: f64) -> Self {
        Self {
            bits: AtomicU64::new(now_unix.to_bits()),
        }
    }

    pub fn set(&self, now_unix: f64) {
        self.bits.store(now_unix.to_bits(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Convert a UTC timestamp to fractional Unix seconds (microsecond precision)
pub fn to_unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}
