use std::collections::HashMap;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use relaydelay_config::{Config, HistogramBuckets, SummaryParams};
use relaydelay_telemetry::{AggregateSummary, Direction, Observation, ObservationSink};

use crate::{CollectorCounters, CollectorGauges, DirectionCounters, SummaryVec};

/// Label names of the delay metrics.
///
/// The names are kept from the legacy exporter so existing dashboards keep working.
const DELAY_LABELS: [&str; 2] = ["IP", "RelayId"];

/// An error setting up or encoding the metrics registry.
#[derive(Debug, thiserror::Error)]
#[error("metrics registry error")]
pub struct MetricsError(#[from] prometheus::Error);

/// The delay histogram and summary, partitioned by relay.
#[derive(Clone)]
pub struct DelayMetrics {
    histogram: HistogramVec,
    summary: SummaryVec,
}

impl DelayMetrics {
    fn new(
        namespace: &str,
        buckets: HistogramBuckets,
        summary: &SummaryParams,
    ) -> Result<Self, MetricsError> {
        let buckets = prometheus::linear_buckets(buckets.start, buckets.width, buckets.count)?;
        let opts = HistogramOpts::new("relay", "nodeh")
            .namespace(namespace)
            .subsystem("Histogram")
            .buckets(buckets);
        let histogram = HistogramVec::new(opts, &DELAY_LABELS)?;

        let summary = SummaryVec::new(
            &format!("{namespace}_Summary_relay"),
            "nodes",
            &DELAY_LABELS,
            &summary.objectives,
            summary.window,
        )?;

        Ok(Self { histogram, summary })
    }
}

impl ObservationSink for DelayMetrics {
    fn record(&self, observation: &Observation<'_>) {
        let relay_id = observation.relay_id.to_string();
        let labels = [observation.address, relay_id.as_str()];

        self.histogram
            .with_label_values(&labels)
            .observe(observation.delay);
        self.summary.observe(&labels, observation.delay);
    }
}

/// All metrics exported by relaydelay.
///
/// The registry is internally synchronized. It is written by the collection loop and read by the
/// metrics endpoint and the push client at the same time.
pub struct MetricsRegistry {
    registry: Registry,
    delays: DelayMetrics,
    counters: HashMap<CollectorCounters, IntCounter>,
    direction_counters: HashMap<DirectionCounters, IntCounterVec>,
    gauges: HashMap<CollectorGauges, IntGauge>,
}

impl MetricsRegistry {
    /// Creates and registers all metrics with names prefixed by `namespace`.
    pub fn new(
        namespace: &str,
        buckets: HistogramBuckets,
        summary: &SummaryParams,
    ) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let delays = DelayMetrics::new(namespace, buckets, summary)?;
        registry.register(Box::new(delays.histogram.clone()))?;
        registry.register(Box::new(delays.summary.clone()))?;

        let mut counters = HashMap::new();
        for metric in CollectorCounters::ALL {
            let opts = Opts::new(metric.name(), metric.help()).namespace(namespace);
            let counter = IntCounter::with_opts(opts)?;
            registry.register(Box::new(counter.clone()))?;
            counters.insert(metric, counter);
        }

        let mut direction_counters = HashMap::new();
        for metric in DirectionCounters::ALL {
            let opts = Opts::new(metric.name(), metric.help()).namespace(namespace);
            let counter = IntCounterVec::new(opts, &["direction"])?;
            registry.register(Box::new(counter.clone()))?;
            direction_counters.insert(metric, counter);
        }

        let mut gauges = HashMap::new();
        for metric in CollectorGauges::ALL {
            let opts = Opts::new(metric.name(), metric.help()).namespace(namespace);
            let gauge = IntGauge::with_opts(opts)?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(metric, gauge);
        }

        Ok(Self {
            registry,
            delays,
            counters,
            direction_counters,
            gauges,
        })
    }

    /// Creates the registry from the `metrics` section of the configuration.
    pub fn from_config(config: &Config) -> Result<Self, MetricsError> {
        Self::new(
            config.metrics_namespace(),
            config.histogram_buckets(),
            config.summary_params(),
        )
    }

    /// Returns the sink for delay observations.
    pub fn delays(&self) -> &DelayMetrics {
        &self.delays
    }

    /// Increments a counter by `value`.
    pub fn incr(&self, metric: CollectorCounters, value: u64) {
        if let Some(counter) = self.counters.get(&metric) {
            counter.inc_by(value);
        }
    }

    /// Increments a direction tagged counter by `value`.
    pub fn incr_direction(&self, metric: DirectionCounters, direction: Direction, value: u64) {
        if let Some(counter) = self.direction_counters.get(&metric) {
            counter
                .with_label_values(&[direction.as_str()])
                .inc_by(value);
        }
    }

    /// Sets a gauge to `value`.
    pub fn set(&self, metric: CollectorGauges, value: i64) {
        if let Some(gauge) = self.gauges.get(&metric) {
            gauge.set(value);
        }
    }

    /// Adds the counts of an aggregation to the direction tagged counters.
    pub fn record_summary(&self, summary: &AggregateSummary) {
        for direction in Direction::ALL {
            let counts = summary.get(direction);
            self.incr_direction(
                DirectionCounters::Observations,
                direction,
                counts.recorded as u64,
            );
            self.incr_direction(
                DirectionCounters::ZeroDelaySuppressed,
                direction,
                counts.zero_suppressed as u64,
            );
            self.incr_direction(
                DirectionCounters::UnknownRelay,
                direction,
                counts.unknown as u64,
            );
        }
    }

    /// Returns the current value of a counter.
    pub fn counter(&self, metric: CollectorCounters) -> u64 {
        self.counters.get(&metric).map_or(0, IntCounter::get)
    }

    /// Returns the current value of a direction tagged counter.
    pub fn direction_counter(&self, metric: DirectionCounters, direction: Direction) -> u64 {
        self.direction_counters
            .get(&metric)
            .map_or(0, |c| c.with_label_values(&[direction.as_str()]).get())
    }

    /// Returns the current value of a gauge.
    pub fn gauge(&self, metric: CollectorGauges) -> i64 {
        self.gauges.get(&metric).map_or(0, IntGauge::get)
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = String::new();
        TextEncoder::new().encode_utf8(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
