use std::ops::AddAssign;

use crate::{DelayReadings, Direction, RelayId, RelayRegistry};

/// A single delay measurement of a known relay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation<'a> {
    /// The id of the measured relay.
    pub relay_id: RelayId,
    /// The configured address of the relay.
    pub address: &'a str,
    /// The measured link direction.
    pub direction: Direction,
    /// The measured delay.
    pub delay: f64,
}

/// Receives observations from the [`Aggregator`].
///
/// Implementations must be safe to call while the same data is read concurrently, for example by
/// a metrics endpoint. The aggregator never locks on behalf of the sink.
pub trait ObservationSink {
    /// Records one observation for the `(address, relay id)` pair.
    fn record(&self, observation: &Observation<'_>);
}

/// Outcome of aggregating readings in one direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DirectionSummary {
    /// Number of observations passed to the sink.
    pub recorded: usize,
    /// Readings of known relays that were dropped because their delay is zero.
    pub zero_suppressed: usize,
    /// Readings for relay ids that are not configured.
    pub unknown: usize,
}

impl AddAssign for DirectionSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.recorded += rhs.recorded;
        self.zero_suppressed += rhs.zero_suppressed;
        self.unknown += rhs.unknown;
    }
}

/// Outcome of [`Aggregator::aggregate`], broken down by direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AggregateSummary {
    /// Counts for `U_R_self` readings.
    pub upstream_to_relay: DirectionSummary,
    /// Counts for `R_U_self` readings.
    pub relay_to_upstream: DirectionSummary,
}

impl AggregateSummary {
    /// Returns the counts of the given direction.
    pub fn get(&self, direction: Direction) -> &DirectionSummary {
        match direction {
            Direction::UpstreamToRelay => &self.upstream_to_relay,
            Direction::RelayToUpstream => &self.relay_to_upstream,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut DirectionSummary {
        match direction {
            Direction::UpstreamToRelay => &mut self.upstream_to_relay,
            Direction::RelayToUpstream => &mut self.relay_to_upstream,
        }
    }

    /// Returns the number of recorded observations in both directions.
    pub fn recorded(&self) -> usize {
        self.upstream_to_relay.recorded + self.relay_to_upstream.recorded
    }
}

impl AddAssign for AggregateSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.upstream_to_relay += rhs.upstream_to_relay;
        self.relay_to_upstream += rhs.relay_to_upstream;
    }
}

/// Records delay readings of configured relays.
#[derive(Debug)]
pub struct Aggregator {
    registry: RelayRegistry,
}

impl Aggregator {
    /// Creates an aggregator for the given relays.
    pub fn new(registry: RelayRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry of known relays.
    pub fn registry(&self) -> &RelayRegistry {
        &self.registry
    }

    /// Records the readings of one telemetry record into `sink`.
    ///
    /// Relays are visited in ascending id order, and for each relay the upstream direction is
    /// recorded before the downstream direction. A delay of exactly zero is treated like a missing
    /// reading and never recorded. Readings for unknown relay ids are only counted.
    pub fn aggregate<S>(&self, readings: &DelayReadings, sink: &S) -> AggregateSummary
    where
        S: ObservationSink + ?Sized,
    {
        let mut summary = AggregateSummary::default();

        for (relay_id, address) in self.registry.iter() {
            for direction in Direction::ALL {
                let Some(&delay) = readings.get(direction).get(&relay_id) else {
                    continue;
                };

                let counts = summary.get_mut(direction);
                if delay == 0.0 {
                    counts.zero_suppressed += 1;
                    continue;
                }

                sink.record(&Observation {
                    relay_id,
                    address,
                    direction,
                    delay,
                });
                counts.recorded += 1;
            }
        }

        for direction in Direction::ALL {
            for &relay_id in readings.get(direction).keys() {
                if !self.registry.contains(relay_id) {
                    relaydelay_log::debug!(
                        %relay_id,
                        %direction,
                        "ignoring delay of unknown relay"
                    );
                    summary.get_mut(direction).unknown += 1;
                }
            }
        }

        summary
    }
}
