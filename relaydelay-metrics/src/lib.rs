//! Metrics registry and exporters for relay delays.
//!
//! [`MetricsRegistry`] holds a histogram and a summary of delays partitioned by relay, plus
//! internal counters of the collection loop. It implements no exporter on its own; the registry
//! is rendered with [`MetricsRegistry::encode_text`] for scraping, or sent to a push gateway with
//! [`PushClient`].
//!
//! ## Delay metrics
//!
//! Both delay metrics carry the labels `IP` (the configured relay address) and `RelayId`:
//!
//! - `{namespace}_Histogram_relay`: linear buckets as configured.
//! - `{namespace}_Summary_relay`: quantiles over a sliding window of recent samples.
#![warn(missing_docs)]

mod push;
mod registry;
mod statsd;
mod summary;

pub use crate::push::*;
pub use crate::registry::*;
pub use crate::statsd::*;
pub use crate::summary::*;
