//! Utilities to deal with millisecond epoch timestamps.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A unix timestamp with millisecond precision (milliseconds elapsed since 1970-01-01 00:00 UTC).
///
/// This is the representation the telemetry store uses for insertion times. It is signed, since
/// the store is free to contain bogus values and subtracting a window from a small timestamp must
/// not wrap around.
#[derive(Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixMillis(i64);

impl UnixMillis {
    /// Creates a timestamp from the given number of milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the number of milliseconds since the UNIX epoch start.
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp moved back by `duration`, saturating at the numeric bounds.
    pub fn saturating_sub(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }
}

impl fmt::Debug for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnixMillis({})", self.0)
    }
}

impl fmt::Display for UnixMillis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
