//! Access to the telemetry document store.
//!
//! The collector only needs two queries: the most recent insertion time, and all records inserted
//! within an open time range. [`TelemetryStore`] abstracts over them. [`MongoStore`] is the
//! production implementation; with the `test` feature, [`MemoryStore`] provides an in-memory
//! replacement that can simulate outages.
#![warn(missing_docs)]

use std::fmt;

use relaydelay_common::UnixMillis;

#[cfg(any(test, feature = "test"))]
mod memory;
mod mongo;

#[cfg(any(test, feature = "test"))]
pub use self::memory::*;
pub use self::mongo::*;

/// An error querying the telemetry store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The client could not be configured or the server could not be reached.
    #[error("failed to connect to the telemetry store")]
    Connect(#[source] mongodb::error::Error),
    /// A query failed.
    #[error("telemetry store query failed")]
    Query(#[source] mongodb::error::Error),
    /// The store is unavailable for another reason.
    #[error("telemetry store unavailable: {0}")]
    Unavailable(String),
}

/// An open interval of insertion times.
///
/// Both bounds are exclusive: a record inserted exactly at `after` or `before` is not contained.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TimeRange {
    /// Exclusive lower bound.
    pub after: UnixMillis,
    /// Exclusive upper bound.
    pub before: UnixMillis,
}

impl TimeRange {
    /// Returns `true` if `time` lies strictly between the bounds.
    pub fn contains(&self, time: UnixMillis) -> bool {
        self.after < time && time < self.before
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.after, self.before)
    }
}

/// A stored telemetry record with a non-empty blob.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    /// The encoded telemetry blob.
    pub blob: String,
    /// When the record was inserted into the store.
    pub inserted_at: UnixMillis,
}

/// Queries the telemetry store.
#[async_trait::async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Returns the most recent insertion time, or `None` if the store holds no records.
    async fn latest_insert_time(&self) -> Result<Option<UnixMillis>, StoreError>;

    /// Returns all records inserted within `range` that carry a non-empty blob.
    ///
    /// The order of the returned records is unspecified.
    async fn find_blobs(&self, range: TimeRange) -> Result<Vec<TelemetryRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_bounds_exclusive() {
        let range = TimeRange {
            after: UnixMillis::from_millis(10),
            before: UnixMillis::from_millis(20),
        };

        assert!(!range.contains(UnixMillis::from_millis(10)));
        assert!(range.contains(UnixMillis::from_millis(11)));
        assert!(range.contains(UnixMillis::from_millis(19)));
        assert!(!range.contains(UnixMillis::from_millis(20)));
        assert_eq!(range.to_string(), "(10, 20)");
    }
}
