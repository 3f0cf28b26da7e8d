use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::core::ConfigError;

/// Convenience result alias for request dispatch.
pub type RestResult<T> = Result<T, RestError>;

/// Terminal outcome of a logical request that did not succeed.
#[derive(Debug, Error)]
pub enum RestError {
    /// The dispatcher was stopped while the request was waiting or in flight.
    #[error("request cancelled: dispatcher stopped")]
    Cancelled,

    /// One physical transmission failed (connection reset, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport failed after {attempts} attempts: {last_error}")]
    TransportExhausted { attempts: u32, last_error: String },

    /// The server rejected the request; retrying cannot change the outcome.
    #[error("http {status}: {message}")]
    Http {
        status: StatusCode,
        code: Option<u64>,
        message: String,
    },

    /// The server asked for a retry delay above the configured ceiling.
    #[error("server retry delay {retry_after:?} exceeds ceiling {ceiling:?}")]
    RetryAfterTooLong {
        retry_after: Duration,
        ceiling: Duration,
    },

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl RestError {
    /// Whether another physical attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
