use std::sync::Arc;
use std::time::Duration;

use relaydelay_common::{RetryBackoff, UnixMillis};
use relaydelay_config::Config;
use relaydelay_log::LogError;
use relaydelay_metrics::{CollectorCounters, CollectorGauges, MetricsRegistry, PushClient};
use relaydelay_store::{TelemetryRecord, TelemetryStore, TimeRange};
use relaydelay_telemetry::{AggregateSummary, Aggregator, Decoder, RelayRegistry, parse};

use crate::{HealthState, PollError, PolledBatch, ShutdownHandle, WatermarkPoller};

/// Outcome of a single collection cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// The queried range, or `None` if the store was empty.
    pub range: Option<TimeRange>,
    /// Number of records fetched from the store.
    pub records: usize,
    /// Records dropped because their blob could not be decoded.
    pub decode_errors: usize,
    /// Records dropped because their readings had the wrong type.
    pub parse_errors: usize,
    /// Counts of recorded and ignored readings.
    pub summary: AggregateSummary,
}

/// Retry policy for polling the store within one cycle.
#[derive(Clone, Copy, Debug)]
struct RetryPolicy {
    max_retries: u32,
    initial_interval: Duration,
    max_interval: Duration,
}

/// The periodic poll, decode, parse and aggregate loop.
///
/// Each cycle polls the store for new records, processes them one after another and finally
/// pushes the registry if a push gateway is configured. A record that fails to decode or parse is
/// logged, counted and skipped. If the store stays unavailable after all retries, the cycle is
/// skipped and the store is reported unhealthy until a later poll succeeds.
pub struct CollectionLoop {
    poller: WatermarkPoller,
    decoder: Decoder,
    aggregator: Aggregator,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthState>,
    push: Option<PushClient>,
    period: Duration,
    retry: RetryPolicy,
}

impl CollectionLoop {
    /// Creates the loop from configuration.
    pub fn new(
        config: &Config,
        store: Arc<dyn TelemetryStore>,
        metrics: Arc<MetricsRegistry>,
        health: Arc<HealthState>,
        push: Option<PushClient>,
    ) -> Self {
        Self {
            poller: WatermarkPoller::new(store),
            decoder: Decoder::new(config.max_decoded_size()),
            aggregator: Aggregator::new(RelayRegistry::from_map(config.relay_nodes())),
            metrics,
            health,
            push,
            period: config.collection_period(),
            retry: RetryPolicy {
                max_retries: config.store_max_retries(),
                initial_interval: config.store_retry_initial_interval(),
                max_interval: config.store_retry_max_interval(),
            },
        }
    }

    /// Returns the upper bound of the last processed range.
    pub fn watermark(&self) -> Option<UnixMillis> {
        self.poller.watermark()
    }

    /// Runs cycles until `shutdown` is notified.
    ///
    /// Shutdown is only observed while sleeping between cycles. A running cycle, including its
    /// push, always completes.
    pub async fn run(mut self, mut shutdown: ShutdownHandle) {
        relaydelay_log::info!(
            period = ?self.period,
            relays = self.aggregator.registry().len(),
            "collection loop started"
        );

        loop {
            // Errors are logged and reported as health by the cycle itself.
            self.run_cycle().await.ok();

            tokio::select! {
                biased;

                () = shutdown.notified() => break,
                () = tokio::time::sleep(self.period) => (),
            }
        }

        relaydelay_log::info!("collection loop stopped");
    }

    /// Runs a single cycle: poll, process all records, then export.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, PollError> {
        self.metrics.incr(CollectorCounters::Cycles, 1);

        let batch = match self.poll_with_retry().await {
            Ok(batch) => batch,
            Err(error) => {
                relaydelay_log::error!(
                    "skipping collection cycle, telemetry store unavailable after {} retries: {}",
                    self.retry.max_retries,
                    LogError(&error)
                );
                self.health.set_store_healthy(false);
                self.metrics.set(CollectorGauges::StoreHealthy, 0);
                return Err(error);
            }
        };

        self.health.set_store_healthy(true);
        self.metrics.set(CollectorGauges::StoreHealthy, 1);
        if let Some(watermark) = self.poller.watermark() {
            self.metrics
                .set(CollectorGauges::WatermarkMillis, watermark.as_millis());
        }

        let report = self.process(batch);
        relaydelay_log::info!(
            records = report.records,
            observations = report.summary.recorded(),
            decode_errors = report.decode_errors,
            parse_errors = report.parse_errors,
            "collection cycle completed"
        );

        self.export().await;
        Ok(report)
    }

    async fn poll_with_retry(&mut self) -> Result<PolledBatch, PollError> {
        let mut backoff = RetryBackoff::new(self.retry.initial_interval, self.retry.max_interval);

        loop {
            let delay = backoff.next_backoff();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.poller.poll(self.period).await {
                Ok(batch) => return Ok(batch),
                Err(error) => {
                    self.metrics.incr(CollectorCounters::StoreErrors, 1);

                    if backoff.attempt() > self.retry.max_retries as usize {
                        return Err(error);
                    }

                    relaydelay_log::warn!(
                        attempt = backoff.attempt(),
                        "failed to poll telemetry store, retrying: {}",
                        LogError(&error)
                    );
                }
            }
        }
    }

    /// Decodes, parses and aggregates all records of a batch.
    fn process(&self, batch: PolledBatch) -> CycleReport {
        let mut report = CycleReport {
            range: batch.range,
            records: batch.records.len(),
            ..Default::default()
        };

        self.metrics
            .incr(CollectorCounters::Records, batch.records.len() as u64);

        for record in &batch.records {
            self.process_record(record, &mut report);
        }

        self.metrics.record_summary(&report.summary);
        report
    }

    fn process_record(&self, record: &TelemetryRecord, report: &mut CycleReport) {
        let plaintext = match self.decoder.decode(&record.blob) {
            Ok(plaintext) => plaintext,
            Err(error) => {
                relaydelay_log::warn!(
                    inserted_at = %record.inserted_at,
                    "dropping telemetry record: {}",
                    LogError(&error)
                );
                self.metrics.incr(CollectorCounters::DecodeErrors, 1);
                report.decode_errors += 1;
                return;
            }
        };

        let readings = match parse(&plaintext) {
            Ok(readings) => readings,
            Err(error) => {
                relaydelay_log::warn!(
                    inserted_at = %record.inserted_at,
                    "dropping telemetry record: {}",
                    LogError(&error)
                );
                self.metrics.incr(CollectorCounters::ParseErrors, 1);
                report.parse_errors += 1;
                return;
            }
        };

        report.summary += self.aggregator.aggregate(&readings, self.metrics.delays());
    }

    async fn export(&self) {
        let Some(push) = &self.push else {
            return;
        };

        if let Err(error) = push.push(&self.metrics).await {
            relaydelay_log::error!("failed to push metrics: {}", LogError(&error));
            self.metrics.incr(CollectorCounters::ExportErrors, 1);
        }
    }
}
