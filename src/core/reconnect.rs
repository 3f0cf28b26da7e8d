use std::time::Duration;

use super::types::WsReconnectStrategy;

/// Linear backoff reconnect strategy with a ceiling.
///
/// The server dictates most retry timing itself (quota and session-invalidation
/// signals), so repeated failures only grow the wait by a fixed step.
#[derive(Clone, Debug)]
pub struct LinearBackoffReconnect {
    base: Duration,
    step: Duration,
    max: Duration,
    failures: u32,
    retry: bool,
}

impl LinearBackoffReconnect {
    pub fn new(base: Duration, step: Duration, max: Duration) -> Self {
        Self {
            base,
            step,
            max: max.max(base),
            failures: 0,
            retry: true,
        }
    }

    pub fn abort(mut self) -> Self {
        self.retry = false;
        self
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for LinearBackoffReconnect {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }
}

impl WsReconnectStrategy for LinearBackoffReconnect {
    fn next_delay(&mut self) -> Duration {
        let delay = self
            .base
            .saturating_add(self.step.saturating_mul(self.failures))
            .min(self.max);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    fn reset(&mut self) {
        self.failures = 0;
    }

    fn should_retry(&self) -> bool {
        self.retry
    }
}
