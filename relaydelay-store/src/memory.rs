use parking_lot::Mutex;
use relaydelay_common::UnixMillis;

use crate::{StoreError, TelemetryRecord, TelemetryStore, TimeRange};

#[derive(Debug, Default)]
struct MemoryInner {
    records: Vec<TelemetryRecord>,
    failures: usize,
    failing: bool,
    queries: Vec<TimeRange>,
}

/// An in-memory [`TelemetryStore`] for tests.
///
/// Records are matched with the same rules as [`MongoStore`](crate::MongoStore): exclusive time
/// bounds and no empty blobs. The store can be switched into a failing mode to simulate outages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record inserted at `millis`. Empty blobs are stored but never returned.
    pub fn insert(&self, blob: impl Into<String>, millis: i64) {
        self.inner.lock().records.push(TelemetryRecord {
            blob: blob.into(),
            inserted_at: UnixMillis::from_millis(millis),
        });
    }

    /// Makes the next `count` queries fail.
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().failures = count;
    }

    /// Makes all queries fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }

    /// Returns the ranges of all successful [`find_blobs`](TelemetryStore::find_blobs) queries.
    pub fn queries(&self) -> Vec<TimeRange> {
        self.inner.lock().queries.clone()
    }

    fn check_available(inner: &mut MemoryInner) -> Result<(), StoreError> {
        if inner.failing {
            return Err(StoreError::Unavailable("store is down".to_owned()));
        }

        if inner.failures > 0 {
            inner.failures -= 1;
            return Err(StoreError::Unavailable("simulated failure".to_owned()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl TelemetryStore for MemoryStore {
    async fn latest_insert_time(&self) -> Result<Option<UnixMillis>, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_available(&mut inner)?;

        Ok(inner.records.iter().map(|r| r.inserted_at).max())
    }

    async fn find_blobs(&self, range: TimeRange) -> Result<Vec<TelemetryRecord>, StoreError> {
        let mut inner = self.inner.lock();
        Self::check_available(&mut inner)?;

        inner.queries.push(range);
        Ok(inner
            .records
            .iter()
            .filter(|r| !r.blob.is_empty() && range.contains(r.inserted_at))
            .cloned()
            .collect())
    }
}
