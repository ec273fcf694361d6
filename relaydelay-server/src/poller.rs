use std::sync::Arc;
use std::time::Duration;

use relaydelay_common::UnixMillis;
use relaydelay_store::{StoreError, TelemetryRecord, TelemetryStore, TimeRange};

/// An error returned by [`WatermarkPoller::poll`].
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The store could not be reached or a query failed.
    #[error("telemetry store unavailable")]
    StoreUnavailable(#[from] StoreError),
}

/// The records found by a single poll.
#[derive(Debug, Default)]
pub struct PolledBatch {
    /// The queried range, or `None` if the store holds no records at all.
    pub range: Option<TimeRange>,
    /// Records inserted within the range, in no particular order.
    pub records: Vec<TelemetryRecord>,
}

/// Fetches telemetry records inserted since the previous poll.
///
/// The poller keeps a watermark: the upper bound of the last successfully queried range. The
/// upper bound of every query is the latest insertion time known to the store, and the lower bound
/// is the watermark. Without a watermark, the lower bound lies one window before the upper bound.
/// Both bounds are exclusive, so a record inserted exactly at the upper bound is skipped by this
/// query and by all later ones.
///
/// The watermark never moves backwards, even if the store reports an older latest insertion time.
/// It is only advanced after a successful query, so a failed poll is retried with the same
/// lower bound.
pub struct WatermarkPoller {
    store: Arc<dyn TelemetryStore>,
    watermark: Option<UnixMillis>,
}

impl WatermarkPoller {
    /// Creates a poller without a watermark.
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            store,
            watermark: None,
        }
    }

    /// Returns the upper bound of the last successful query.
    pub fn watermark(&self) -> Option<UnixMillis> {
        self.watermark
    }

    /// Queries the records inserted since the last poll.
    ///
    /// `window` is the length of the queried range on the first poll only.
    pub async fn poll(&mut self, window: Duration) -> Result<PolledBatch, PollError> {
        let Some(latest) = self.store.latest_insert_time().await? else {
            relaydelay_log::debug!("telemetry store is empty");
            return Ok(PolledBatch::default());
        };

        let after = match self.watermark {
            Some(watermark) => watermark,
            None => latest.saturating_sub(window),
        };

        if latest < after {
            relaydelay_log::warn!(
                %latest,
                watermark = %after,
                "latest insert time is older than the watermark"
            );
        }

        let range = TimeRange {
            after,
            before: latest.max(after),
        };

        let records = self.store.find_blobs(range).await?;
        self.watermark = Some(range.before);

        relaydelay_log::debug!(%range, records = records.len(), "polled telemetry store");

        Ok(PolledBatch {
            range: Some(range),
            records,
        })
    }
}
