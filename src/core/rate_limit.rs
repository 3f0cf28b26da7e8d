use rand::{Rng, SeedableRng, rngs::SmallRng};
use std::time::Duration;
use tokio::time::Instant;

use super::types::{GatewayError, GatewayResult};

/// Windowed rate limiter guarding outbound gateway commands.
///
/// Handshake and heartbeat frames bypass it; everything a caller sends through
/// the session actor is counted against the window.
#[derive(Debug, Clone)]
pub struct WsRateLimiter {
    max_per_window: u32,
    window: Duration,
    window_start: Instant,
    remaining: u32,
}

impl WsRateLimiter {
    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            window_start: Instant::now(),
            remaining: max_per_window,
        }
    }

    fn reset_window(&mut self, now: Instant) {
        self.window_start = now;
        self.remaining = self.max_per_window;
    }

    fn time_until_reset(&self, now: Instant) -> Duration {
        self.window
            .saturating_sub(now.saturating_duration_since(self.window_start))
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn try_acquire(&mut self) -> GatewayResult<()> {
        let now = Instant::now();
        if now.saturating_duration_since(self.window_start) >= self.window {
            self.reset_window(now);
        }

        if self.max_per_window == 0 {
            return Err(GatewayError::RateLimited {
                message: "outbound command budget configured as zero".to_string(),
                retry_after: Some(self.window),
            });
        }

        if self.remaining == 0 {
            return Err(GatewayError::RateLimited {
                message: "outbound command budget exhausted".to_string(),
                retry_after: Some(self.time_until_reset(now)),
            });
        }

        self.remaining -= 1;
        Ok(())
    }
}

/// Scale `base` by a random factor in `[0.5, 1.0]`.
pub fn jitter_delay(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }

    let mut rng = SmallRng::from_entropy();
    let jitter: f64 = rng.gen_range(0.5..=1.0);
    base.mul_f64(jitter)
}

/// Random first-heartbeat offset in `[0, interval)`.
///
/// Spreads the first beat of many sessions across the whole interval so they do
/// not fire in lockstep after a shared outage.
pub fn heartbeat_jitter(interval: Duration) -> Duration {
    if interval.is_zero() {
        return interval;
    }

    let mut rng = SmallRng::from_entropy();
    let fraction: f64 = rng.gen_range(0.0..1.0);
    interval.mul_f64(fraction)
}

/// Uniform random delay in `[min, max]`.
pub fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }

    let mut rng = SmallRng::from_entropy();
    let span = (max - min).as_nanos().min(u64::MAX as u128) as u64;
    min + Duration::from_nanos(rng.gen_range(0..=span))
}
