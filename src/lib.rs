//! Client transport for a rate-limited REST API and its streaming gateway.
//!
//! The request half ([`rest`]) admits every call against per-route quota
//! buckets and an account-wide cooldown, retrying quota violations and
//! transient failures internally. The streaming half ([`gateway`]) keeps one
//! kameo actor per session that identifies, heartbeats, resumes and republishes
//! dispatch events to subscribers across reconnects.

pub mod core;
pub mod gateway;
pub mod observer;
pub mod rest;
pub mod supervision;
pub mod testing;
pub mod tls;
pub mod transport;

pub use crate::core::{ConfigError, Credential, GatewayError, GatewayResult, Intents};
pub use gateway::{
    EventStream, GatewayActor, GatewayConfig, GatewayEvent, Subscribe, spawn_gateway,
    spawn_gateway_with,
};
pub use observer::{ObserverHook, TransportObserver};
pub use rest::{RequestDispatcher, RestConfig, RestError, RestResult, Route};
