use std::time::Duration;

use dashmap::DashMap;

use super::Host;
use crate::config::BackoffConfig;

/// Decides how long a failing host is kept out of rotation.
pub trait BackoffPolicy: Send + Sync {
    /// Record one more failure for `host` and return its cooldown.
    fn compute(&self, host: &Host) -> Duration;

    /// Forget the failure history of `host` after a successful request.
    fn reset(&self, host: &Host);
}

/// Exponential cooldown per host: `initial`, then multiplied by `multiplier`
/// on every further failure, never above `ceiling`.
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    ceiling: Duration,
    current: DashMap<Host, Duration>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 2.0, Duration::from_secs(512))
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, multiplier: f64, ceiling: Duration) -> Self {
        Self {
            initial: initial.min(ceiling),
            multiplier: multiplier.max(1.0),
            ceiling,
            current: DashMap::new(),
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_ms),
            config.multiplier,
            Duration::from_millis(config.ceiling_ms),
        )
    }

    /// Cooldown that the last failure of `host` produced, if any.
    pub fn current(&self, host: &Host) -> Option<Duration> {
        self.current.get(host).map(|d| *d)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn compute(&self, host: &Host) -> Duration {
        let mut entry = self.current.entry(host.clone()).or_insert(Duration::ZERO);
        let next = if entry.is_zero() {
            self.initial
        } else {
            // an overflowing product saturates at the ceiling
            let grown = Duration::try_from_secs_f64(entry.as_secs_f64() * self.multiplier)
                .unwrap_or(self.ceiling);
            std::cmp::min(self.ceiling, grown)
        };
        *entry = next;
        next
    }

    fn reset(&self, host: &Host) {
        self.current.remove(host);
    }
}
