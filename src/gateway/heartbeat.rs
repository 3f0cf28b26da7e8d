use std::time::Duration;

use tokio::time::Instant;

/// What the heartbeat timer should do on this tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatTick {
    /// Send a heartbeat; an acknowledgement is now outstanding.
    Send,
    /// The previous heartbeat was never acknowledged.
    Missed,
}

/// Heartbeat send/ack bookkeeping for one connection.
///
/// At most one heartbeat is outstanding: a tick while the previous beat is
/// still unacknowledged reports [`HeartbeatTick::Missed`] instead of sending.
#[derive(Clone, Debug, Default)]
pub struct HeartbeatState {
    interval: Option<Duration>,
    ack_pending: bool,
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    last_rtt: Option<Duration>,
}

impl HeartbeatState {
    pub fn start(&mut self, interval: Duration) {
        self.interval = Some(interval);
        self.ack_pending = false;
        self.last_sent = None;
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    pub fn last_rtt(&self) -> Option<Duration> {
        self.last_rtt
    }

    pub fn tick(&mut self, now: Instant) -> HeartbeatTick {
        if self.ack_pending {
            return HeartbeatTick::Missed;
        }
        self.ack_pending = true;
        self.last_sent = Some(now);
        HeartbeatTick::Send
    }

    /// The server asked for an immediate beat; the regular schedule is unchanged.
    pub fn on_requested(&mut self, now: Instant) {
        if !self.ack_pending {
            self.last_sent = Some(now);
        }
    }

    /// Returns the round trip of the acknowledged beat, when one was sent.
    pub fn on_ack(&mut self, now: Instant) -> Option<Duration> {
        self.ack_pending = false;
        self.last_ack = Some(now);
        let rtt = self
            .last_sent
            .take()
            .map(|sent| now.saturating_duration_since(sent));
        if rtt.is_some() {
            self.last_rtt = rtt;
        }
        rtt
    }

    /// Forget everything tied to the current connection.
    pub fn reset(&mut self) {
        self.interval = None;
        self.ack_pending = false;
        self.last_sent = None;
        self.last_ack = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn send_and_ack_alternate() {
        let mut heartbeat = HeartbeatState::default();
        heartbeat.start(Duration::from_secs(45));
        let t0 = Instant::now();

        assert_eq!(heartbeat.tick(t0), HeartbeatTick::Send);
        assert!(heartbeat.ack_pending());

        let rtt = heartbeat.on_ack(t0 + Duration::from_millis(40));
        assert_eq!(rtt, Some(Duration::from_millis(40)));
        assert!(!heartbeat.ack_pending());
        assert_eq!(heartbeat.tick(t0 + Duration::from_secs(45)), HeartbeatTick::Send);
    }

    #[tokio::test(start_paused = true)]
    async fn unacknowledged_beat_is_reported_as_missed() {
        let mut heartbeat = HeartbeatState::default();
        heartbeat.start(Duration::from_secs(45));
        let t0 = Instant::now();

        assert_eq!(heartbeat.tick(t0), HeartbeatTick::Send);
        assert_eq!(
            heartbeat.tick(t0 + Duration::from_secs(45)),
            HeartbeatTick::Missed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_connection_state_but_keeps_last_rtt() {
        let mut heartbeat = HeartbeatState::default();
        heartbeat.start(Duration::from_secs(1));
        let t0 = Instant::now();
        heartbeat.tick(t0);
        heartbeat.on_ack(t0 + Duration::from_millis(5));
        heartbeat.tick(t0 + Duration::from_secs(1));

        heartbeat.reset();
        assert_eq!(heartbeat.interval(), None);
        assert!(!heartbeat.ack_pending());
        assert_eq!(heartbeat.last_rtt(), Some(Duration::from_millis(5)));
    }
}
