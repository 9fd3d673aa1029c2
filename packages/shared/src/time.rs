//! Time-related utilities with clock abstraction for testability.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get current Unix timestamp (milliseconds)
    fn now_millis(&self) -> i64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        get_timestamp_millis()
    }
}

/// Manually driven clock for tests.
///
/// Starts at a fixed instant and only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a new manual clock stopped at the given timestamp
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    /// Move the clock forward by `millis`
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Get current Unix timestamp (milliseconds)
pub fn get_timestamp_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert Unix timestamp (milliseconds) to RFC 3339 in UTC.
///
/// Out-of-range timestamps fall back to the Unix epoch.
pub fn timestamp_to_rfc3339(timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
        .unwrap_or_default()
        .to_rfc3339()
}
