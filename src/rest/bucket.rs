use std::time::Duration;

use tokio::time::Instant;

use super::headers::QuotaSnapshot;

/// Window assumed when the server reports a reset that is already due.
const MIN_RESET_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Refused; capacity returns no earlier than this instant.
    WaitUntil(Instant),
}

/// Quota state for one server-assigned bucket.
///
/// Local decrements between responses are a pessimistic estimate; every
/// response overwrites the counters with the server's values.
#[derive(Clone, Debug)]
pub struct QuotaBucket {
    id: String,
    limit: u32,
    remaining: u32,
    reset_at: Instant,
    reset_interval: Duration,
}

impl QuotaBucket {
    pub fn new(id: impl Into<String>, snapshot: QuotaSnapshot, now: Instant) -> Self {
        let reset_interval = snapshot.reset_after.max(MIN_RESET_INTERVAL);
        Self {
            id: id.into(),
            limit: snapshot.limit.max(snapshot.remaining),
            remaining: snapshot.remaining,
            reset_at: now + snapshot.reset_after,
            reset_interval,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    pub fn reset_interval(&self) -> Duration {
        self.reset_interval
    }

    /// Start a fresh window if the current one has elapsed.
    ///
    /// Returns true when the bucket was replenished.
    pub fn replenish_if_due(&mut self, now: Instant) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.remaining = self.limit;
        self.reset_at = now + self.reset_interval;
        true
    }

    /// Take one slot, or report when the next slot frees up.
    pub fn admit(&mut self, now: Instant) -> Admission {
        self.replenish_if_due(now);
        if self.remaining == 0 {
            return Admission::WaitUntil(self.reset_at);
        }
        self.remaining -= 1;
        Admission::Allow
    }

    /// Overwrite local state with the server's view.
    pub fn update(&mut self, snapshot: QuotaSnapshot, now: Instant) {
        self.limit = snapshot.limit.max(snapshot.remaining);
        self.remaining = snapshot.remaining;
        self.reset_at = now + snapshot.reset_after;
        // The server only reports time left in the current window; keep the
        // longest window seen as the auto-advance estimate.
        self.reset_interval = self.reset_interval.max(snapshot.reset_after);
    }
}
