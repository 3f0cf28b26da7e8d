//! Side-channel diagnostics hook.
//!
//! Observers see what the transport decided; they never influence it.

use std::sync::Arc;
use std::time::Duration;

/// Receives diagnostic events from the request dispatcher and gateway sessions.
///
/// Every method has a no-op default so implementors override only what they track.
pub trait TransportObserver: Send + Sync + 'static {
    /// A quota bucket was first seen for a route.
    #[inline]
    fn bucket_created(&self, _bucket: &str, _route: &str, _limit: u32) {}

    /// An account-wide cooldown was engaged after a global quota violation.
    #[inline]
    fn cooldown_engaged(&self, _retry_after: Duration) {}

    /// A logical request is being transmitted again.
    #[inline]
    fn request_retried(&self, _route: &str, _attempt: u32, _reason: &str) {}

    /// A gateway session scheduled a reconnect.
    #[inline]
    fn reconnect_triggered(&self, _connection: &str, _resume: bool, _reason: &str) {}

    /// The server declared the session unusable; the next handshake is a fresh identify.
    #[inline]
    fn session_invalidated(&self, _connection: &str) {}

    /// The handshake completed. `resumed` is false for a fresh identify.
    #[inline]
    fn session_ready(&self, _connection: &str, _resumed: bool) {}

    #[inline]
    fn protocol_violation(&self, _connection: &str, _reason: &str) {}
}

/// Convenient alias for passing around shared observers.
pub type ObserverHook = Arc<dyn TransportObserver>;
