use hdrhistogram::Histogram;
use std::time::Duration;
use tokio::time::Instant;

use super::circular_buffer::CircularBuffer;
use super::types::ConnectionStats;

const MAX_RECENT_ERRORS: usize = 100;
const MAX_ERROR_TEXT_BYTES: usize = 1024;
// Heartbeat round trips above one minute are clamped into the top bucket.
const MAX_TRACKED_LATENCY_US: u64 = 60_000_000;

#[derive(Debug, Clone)]
struct ServerErrorRec {
    _timestamp: Instant,
    code: Option<u16>,
    _message: String,
}

#[derive(Debug, Clone)]
struct InternalErrorRec {
    _timestamp: Instant,
    _context: String,
    error: String,
}

fn truncate_string(s: &str) -> String {
    if s.len() <= MAX_ERROR_TEXT_BYTES {
        return s.to_string();
    }

    let mut end = MAX_ERROR_TEXT_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Per-session health bookkeeping: counters, heartbeat latency, recent errors.
///
/// Owned by the session actor; counters survive reconnects, the uptime and
/// message-age clocks restart on every established connection.
#[derive(Debug)]
pub struct WsHealthMonitor {
    connection_started: Instant,
    last_message_received: Instant,
    last_message_sent: Instant,
    message_count: u64,
    error_count: u64,
    reconnect_count: u64,
    last_latency: Option<Duration>,
    server_errors: CircularBuffer<ServerErrorRec>,
    internal_errors: CircularBuffer<InternalErrorRec>,
    latency_histogram: Option<Histogram<u64>>,
}

impl Default for WsHealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl WsHealthMonitor {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            connection_started: now,
            last_message_received: now,
            last_message_sent: now,
            message_count: 0,
            error_count: 0,
            reconnect_count: 0,
            last_latency: None,
            server_errors: CircularBuffer::new(MAX_RECENT_ERRORS),
            internal_errors: CircularBuffer::new(MAX_RECENT_ERRORS),
            latency_histogram: Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_US, 3).ok(),
        }
    }

    pub fn reset(&mut self) {
        let now = Instant::now();
        self.connection_started = now;
        self.last_message_received = now;
        self.last_message_sent = now;
    }

    pub fn record_message(&mut self) {
        self.last_message_received = Instant::now();
        self.message_count = self.message_count.saturating_add(1);
    }

    pub fn record_sent(&mut self) {
        self.last_message_sent = Instant::now();
    }

    pub fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    /// Record a close code or error reported by the server.
    pub fn record_server_error(&mut self, code: Option<u16>, message: &str) {
        self.record_error();
        self.server_errors.push(ServerErrorRec {
            _timestamp: Instant::now(),
            code,
            _message: truncate_string(message),
        });
    }

    pub fn record_internal_error(&mut self, context: &str, error: &str) {
        self.record_error();
        self.internal_errors.push(InternalErrorRec {
            _timestamp: Instant::now(),
            _context: truncate_string(context),
            error: truncate_string(error),
        });
    }

    pub fn record_rtt(&mut self, latency: Duration) {
        self.last_latency = Some(latency);
        if let Some(histogram) = self.latency_histogram.as_mut() {
            let micros = (latency.as_micros().min(u64::MAX as u128) as u64)
                .clamp(1, MAX_TRACKED_LATENCY_US);
            let _ = histogram.record(micros);
        }
    }

    pub fn increment_reconnect(&mut self) {
        self.reconnect_count = self.reconnect_count.saturating_add(1);
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    pub fn get_stats(&self) -> ConnectionStats {
        let (latency_samples, p50, p99) = match self.latency_histogram.as_ref() {
            Some(histogram) if !histogram.is_empty() => (
                histogram.len(),
                histogram.value_at_percentile(50.0),
                histogram.value_at_percentile(99.0),
            ),
            _ => (0, 0, 0),
        };

        ConnectionStats {
            uptime: self.connection_started.elapsed(),
            messages: self.message_count,
            errors: self.error_count,
            reconnects: self.reconnect_count,
            last_message_age: self.last_message_received.elapsed(),
            recent_server_errors: self.server_errors.len(),
            recent_internal_errors: self.internal_errors.len(),
            last_close_code: self.server_errors.iter().rev().find_map(|rec| rec.code),
            last_latency: self.last_latency,
            p50_latency_us: p50,
            p99_latency_us: p99,
            latency_samples,
        }
    }
}
