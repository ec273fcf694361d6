use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;

/// Backoff multiplier (1.5 which is 50% increase per backoff).
const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Randomization factor (0 which is no randomization).
const DEFAULT_RANDOMIZATION: f64 = 0.0;

/// A retry interval generator that increases timeouts with exponential backoff.
///
/// The first call to [`next_backoff`](Self::next_backoff) yields a zero duration, so the first
/// attempt happens right away. Every subsequent call returns a longer interval, capped at the
/// maximum interval passed to [`new`](Self::new).
#[derive(Debug)]
pub struct RetryBackoff {
    backoff: ExponentialBackoff,
    attempt: usize,
}

impl RetryBackoff {
    /// Creates a new retry backoff based on the given intervals.
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        let initial_interval = initial_interval.min(max_interval);

        let backoff = ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            randomization_factor: DEFAULT_RANDOMIZATION,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval,
            max_elapsed_time: None,
            ..Default::default()
        };

        RetryBackoff {
            backoff,
            attempt: 0,
        }
    }

    /// Returns the number of the retry attempt.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns the next backoff duration.
    pub fn next_backoff(&mut self) -> Duration {
        let duration = match self.attempt {
            0 => Duration::ZERO,
            _ => self
                .backoff
                .next_backoff()
                .unwrap_or(self.backoff.max_interval),
        };

        self.attempt += 1;
        duration
    }
}
