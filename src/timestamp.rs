//! File timestamps.
//!
//! 7z stores timestamps as Windows FILETIME values: 100-nanosecond ticks
//! since January 1, 1601 (UTC). [`Timestamp`] wraps the raw value and
//! converts to Unix time and [`SystemTime`] without losing the 100 ns
//! precision.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Difference between the FILETIME epoch (1601-01-01) and the Unix epoch
/// (1970-01-01), in 100-nanosecond ticks.
const FILETIME_UNIX_DIFF: u64 = 116444736000000000;

/// 100-nanosecond ticks per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

/// A timestamp from a 7z archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    filetime: u64,
}

impl Timestamp {
    /// Wraps a raw Windows FILETIME value.
    #[inline]
    pub const fn from_filetime(filetime: u64) -> Self {
        Self { filetime }
    }

    /// Returns the raw FILETIME value.
    #[inline]
    pub const fn filetime(&self) -> u64 {
        self.filetime
    }

    /// Returns whole seconds since the Unix epoch. Times before 1970 are
    /// negative.
    pub fn as_unix_secs(&self) -> i64 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            ((self.filetime - FILETIME_UNIX_DIFF) / TICKS_PER_SECOND) as i64
        } else {
            -(((FILETIME_UNIX_DIFF - self.filetime).div_ceil(TICKS_PER_SECOND)) as i64)
        }
    }

    /// Returns the sub-second remainder in nanoseconds (always a multiple
    /// of 100, and always non-negative for post-1970 times).
    pub fn subsec_nanos(&self) -> u32 {
        if self.filetime >= FILETIME_UNIX_DIFF {
            (((self.filetime - FILETIME_UNIX_DIFF) % TICKS_PER_SECOND) * 100) as u32
        } else {
            0
        }
    }

    /// Converts to a [`SystemTime`].
    pub fn as_system_time(&self) -> SystemTime {
        if self.filetime >= FILETIME_UNIX_DIFF {
            let ticks = self.filetime - FILETIME_UNIX_DIFF;
            UNIX_EPOCH + Duration::from_nanos(ticks.saturating_mul(100))
        } else {
            let ticks = FILETIME_UNIX_DIFF - self.filetime;
            UNIX_EPOCH - Duration::from_nanos(ticks.saturating_mul(100))
        }
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> Self {
        ts.as_system_time()
    }
}
