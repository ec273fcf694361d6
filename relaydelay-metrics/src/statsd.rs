/// Counter metrics of the collection loop.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CollectorCounters {
    /// Number of collection cycles that started.
    Cycles,
    /// Number of telemetry records fetched from the store.
    Records,
    /// Number of records dropped because their blob could not be decoded.
    DecodeErrors,
    /// Number of records dropped because their readings had the wrong type.
    ParseErrors,
    /// Number of failed store queries, including retries.
    StoreErrors,
    /// Number of failed pushes to the push gateway.
    ExportErrors,
}

impl CollectorCounters {
    /// All counters, in registration order.
    pub const ALL: [Self; 6] = [
        Self::Cycles,
        Self::Records,
        Self::DecodeErrors,
        Self::ParseErrors,
        Self::StoreErrors,
        Self::ExportErrors,
    ];

    /// The metric name without the namespace.
    pub fn name(&self) -> &'static str {
        match self {
            CollectorCounters::Cycles => "cycles_total",
            CollectorCounters::Records => "records_total",
            CollectorCounters::DecodeErrors => "decode_errors_total",
            CollectorCounters::ParseErrors => "parse_errors_total",
            CollectorCounters::StoreErrors => "store_errors_total",
            CollectorCounters::ExportErrors => "export_errors_total",
        }
    }

    pub(crate) fn help(&self) -> &'static str {
        match self {
            CollectorCounters::Cycles => "Collection cycles started",
            CollectorCounters::Records => "Telemetry records fetched from the store",
            CollectorCounters::DecodeErrors => "Telemetry records with an undecodable blob",
            CollectorCounters::ParseErrors => "Telemetry records with invalid readings",
            CollectorCounters::StoreErrors => "Failed store queries",
            CollectorCounters::ExportErrors => "Failed pushes to the push gateway",
        }
    }
}

/// Counter metrics of the aggregator.
///
/// These metrics are tagged with:
/// - `direction`: `ur` for `U_R_self` readings, `ru` for `R_U_self` readings.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DirectionCounters {
    /// Number of delay observations recorded.
    Observations,
    /// Number of readings of known relays dropped because the delay is zero.
    ZeroDelaySuppressed,
    /// Number of readings for relay ids missing from the configuration.
    UnknownRelay,
}

impl DirectionCounters {
    /// All counters, in registration order.
    pub const ALL: [Self; 3] = [
        Self::Observations,
        Self::ZeroDelaySuppressed,
        Self::UnknownRelay,
    ];

    /// The metric name without the namespace.
    pub fn name(&self) -> &'static str {
        match self {
            DirectionCounters::Observations => "observations_total",
            DirectionCounters::ZeroDelaySuppressed => "zero_delay_suppressed_total",
            DirectionCounters::UnknownRelay => "unknown_relay_total",
        }
    }

    pub(crate) fn help(&self) -> &'static str {
        match self {
            DirectionCounters::Observations => "Delay observations recorded",
            DirectionCounters::ZeroDelaySuppressed => "Zero delay readings that were not recorded",
            DirectionCounters::UnknownRelay => "Readings of relays missing from the configuration",
        }
    }
}

/// Gauge metrics of the collection loop.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CollectorGauges {
    /// `1` while the store answers queries, `0` after retries have been exhausted.
    StoreHealthy,
    /// Upper bound of the last processed time window in epoch milliseconds.
    WatermarkMillis,
}

impl CollectorGauges {
    /// All gauges, in registration order.
    pub const ALL: [Self; 2] = [Self::StoreHealthy, Self::WatermarkMillis];

    /// The metric name without the namespace.
    pub fn name(&self) -> &'static str {
        match self {
            CollectorGauges::StoreHealthy => "store_healthy",
            CollectorGauges::WatermarkMillis => "watermark_millis",
        }
    }

    pub(crate) fn help(&self) -> &'static str {
        match self {
            CollectorGauges::StoreHealthy => "Whether the last store query succeeded",
            CollectorGauges::WatermarkMillis => "Upper bound of the last processed window",
        }
    }
}
