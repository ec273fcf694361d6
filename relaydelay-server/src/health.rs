use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

/// Checks whether relaydelay is alive and healthy based on its variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
pub enum IsHealthy {
    /// Check if the process is alive at all.
    #[serde(rename = "live")]
    Liveness,
    /// Check if the collector can reach the store and has completed a cycle.
    #[serde(rename = "ready")]
    Readiness,
}

/// Health of the collector, shared between the collection loop and the HTTP endpoints.
#[derive(Debug, Default)]
pub struct HealthState {
    store_healthy: AtomicBool,
    is_shutting_down: AtomicBool,
}

impl HealthState {
    /// Creates the state of a collector that has not polled the store yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of the latest store interaction.
    pub fn set_store_healthy(&self, healthy: bool) {
        self.store_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Returns `true` if the last store interaction succeeded.
    ///
    /// This is `false` before the first cycle completes its poll.
    pub fn is_store_healthy(&self) -> bool {
        self.store_healthy.load(Ordering::Relaxed)
    }

    /// Marks the process as shutting down, which fails readiness checks.
    pub fn set_shutting_down(&self) {
        self.is_shutting_down.store(true, Ordering::Relaxed);
    }

    /// Evaluates the given health check.
    pub fn check(&self, kind: IsHealthy) -> bool {
        match kind {
            IsHealthy::Liveness => true,
            IsHealthy::Readiness => {
                !self.is_shutting_down.load(Ordering::Relaxed) && self.is_store_healthy()
            }
        }
    }
}
