use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Convenience result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Canonical streaming-side error surface.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: close code {code}")]
    AuthenticationFailed { code: u16 },

    #[error("Session rejected by server: close code {code}")]
    Rejected { code: u16 },

    #[error("Transport error ({context}): {error}")]
    TransportError {
        context: &'static str,
        error: String,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Actor error: {0}")]
    ActorError(String),

    #[error("Timeout: {context}")]
    Timeout { context: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error("Backpressure: outbound queue full")]
    OutboundQueueFull,

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },
}

/// Rejected configuration values. These are the only errors allowed to keep a
/// session or dispatcher from starting.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("credential is empty")]
    EmptyCredential,

    #[error("credential contains whitespace or control characters")]
    MalformedCredential,

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Transport-independent buffer sizing parameters used for websocket configuration.
#[derive(Clone, Copy, Debug)]
pub struct WebSocketBufferConfig {
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
}

impl Default for WebSocketBufferConfig {
    fn default() -> Self {
        Self {
            write_buffer_bytes: 128 << 10,
            max_write_buffer_bytes: 256 << 10,
            // Ready payloads for large accounts run to several megabytes.
            max_message_bytes: 16 * 1024 * 1024,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

/// TLS configuration for websocket connections.
///
/// Certificate validation is on unless explicitly disabled for development.
#[derive(Clone, Copy, Debug)]
pub struct WsTlsConfig {
    pub validate_certs: bool,
}

impl Default for WsTlsConfig {
    fn default() -> Self {
        Self {
            validate_certs: true,
        }
    }
}

/// Basic connection statistics snapshot.
#[derive(Clone, Debug)]
pub struct ConnectionStats {
    pub uptime: Duration,
    pub messages: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub last_message_age: Duration,
    pub recent_server_errors: usize,
    pub recent_internal_errors: usize,
    /// Close code of the most recent server-initiated close, if any carried one.
    pub last_close_code: Option<u16>,
    pub last_latency: Option<Duration>,
    pub p50_latency_us: u64,
    pub p99_latency_us: u64,
    pub latency_samples: u64,
}

/// Why a gateway connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsDisconnectCause {
    /// The server sent a close frame (or the socket closed with a known code).
    RemoteClosed { code: Option<u16>, reason: String },
    ReadFailure { error: String },
    StreamEnded,
    HandshakeFailed { message: String },
    /// No heartbeat acknowledgement arrived before the next tick.
    HeartbeatTimeout,
    HelloTimeout,
    ProtocolViolation { reason: String },
    /// The server asked the client to reconnect and resume.
    ReconnectRequested,
    /// The server declared the session unusable.
    SessionInvalidated,
    /// The local caller asked for a reconnect.
    ClientRequested,
    WriterFailed { error: String },
}

impl fmt::Display for WsDisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteClosed {
                code: Some(code),
                reason,
            } => write!(f, "remote closed (code={code} reason={reason})"),
            Self::RemoteClosed { code: None, .. } => f.write_str("remote closed"),
            Self::ReadFailure { error } => write!(f, "read error: {error}"),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::HandshakeFailed { message } => write!(f, "handshake failed: {message}"),
            Self::HeartbeatTimeout => f.write_str("heartbeat not acknowledged"),
            Self::HelloTimeout => f.write_str("no hello received"),
            Self::ProtocolViolation { reason } => write!(f, "protocol violation: {reason}"),
            Self::ReconnectRequested => f.write_str("server requested reconnect"),
            Self::SessionInvalidated => f.write_str("session invalidated"),
            Self::ClientRequested => f.write_str("client requested reconnect"),
            Self::WriterFailed { error } => write!(f, "writer failed: {error}"),
        }
    }
}

/// Actions the reconnect policy may take after a disconnect classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsDisconnectAction {
    ImmediateReconnect,
    BackoffReconnect,
    Abort,
}

/// Abstract reconnect strategy trait.
pub trait WsReconnectStrategy: Send + Sync + 'static {
    fn next_delay(&mut self) -> Duration;
    fn reset(&mut self);
    fn should_retry(&self) -> bool;
}
