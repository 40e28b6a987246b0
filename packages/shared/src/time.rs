//! Time-related utilities with clock abstraction for testability.
//!
//! Wire timestamps are whole seconds since the Unix epoch.

use chrono::{DateTime, Local, SecondsFormat, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get current Unix timestamp (seconds)
    fn now_secs(&self) -> u64;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        current_timestamp()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: u64,
}

impl FixedClock {
    /// Create a new fixed clock with the given timestamp
    pub fn new(fixed_time_secs: u64) -> Self {
        Self {
            fixed_time: fixed_time_secs,
        }
    }
}

impl Clock for FixedClock {
    fn now_secs(&self) -> u64 {
        self.fixed_time
    }
}

/// Get current Unix timestamp (seconds). Clamped to 0 for clocks set before the epoch.
pub fn current_timestamp() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn to_utc(timestamp_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(timestamp_secs).ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Convert Unix timestamp (seconds) to UTC RFC 3339 format.
///
/// Timestamps chrono cannot represent are rendered as the raw number.
pub fn timestamp_to_utc_rfc3339(timestamp_secs: u64) -> String {
    to_utc(timestamp_secs)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| timestamp_secs.to_string())
}

/// Convert Unix timestamp (seconds) to the local time zone in RFC 3339 format
pub fn timestamp_to_local_rfc3339(timestamp_secs: u64) -> String {
    to_utc(timestamp_secs)
        .map(|dt| {
            dt.with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Secs, false)
        })
        .unwrap_or_else(|| timestamp_secs.to_string())
}
