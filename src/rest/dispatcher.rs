//! Admission-controlled request dispatcher.
//!
//! Every logical request waits for the global cooldown and its route's bucket,
//! transmits, feeds the response's quota headers back into the registry and
//! either resolves or loops. Quota violations retry without bound (the server
//! dictates the delay); transport failures and 5xx responses retry a fixed
//! number of times with linear backoff.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::bucket::Admission;
use super::config::RestConfig;
use super::error::{RestError, RestResult};
use super::headers::{ErrorBody, QuotaHeaders, QuotaViolation};
use super::registry::BucketRegistry;
use super::route::Route;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::core::ConfigError;

/// Account-wide "nothing before T" timestamp.
///
/// Stored as whole milliseconds past the dispatcher's epoch, rounded up so a
/// request is never admitted early. Zero means unset.
#[derive(Debug)]
struct GlobalCooldown {
    epoch: Instant,
    until_ms: AtomicU64,
}

impl GlobalCooldown {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            until_ms: AtomicU64::new(0),
        }
    }

    fn engage(&self, until: Instant) {
        let offset = until.saturating_duration_since(self.epoch);
        let ms = offset.as_nanos().div_ceil(1_000_000).min(u64::MAX as u128) as u64;
        self.until_ms.fetch_max(ms.max(1), Ordering::AcqRel);
    }

    fn pending(&self, now: Instant) -> Option<Instant> {
        let ms = self.until_ms.load(Ordering::Acquire);
        if ms == 0 {
            return None;
        }
        let until = self.epoch + Duration::from_millis(ms);
        (until > now).then_some(until)
    }
}

/// One logical request across all its physical attempts.
#[derive(Debug)]
struct PendingRequest {
    method: Method,
    route_key: String,
    major_key: String,
    url: String,
    body: Option<Bytes>,
    attempt: u32,
    transient_failures: u32,
    first_attempted_at: Option<Instant>,
}

impl PendingRequest {
    fn to_http(&self, defaults: &HeaderMap) -> HttpRequest {
        let mut headers = defaults.clone();
        if self.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers,
            body: self.body.clone(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.first_attempted_at
            .map(|at| at.elapsed().as_millis().min(u64::MAX as u128) as u64)
            .unwrap_or(0)
    }
}

struct DispatcherInner<H: HttpTransport> {
    config: RestConfig,
    base_url: String,
    default_headers: HeaderMap,
    transport: H,
    registry: BucketRegistry,
    cooldown: GlobalCooldown,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl<H: HttpTransport> Drop for DispatcherInner<H> {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Cloneable handle to one dispatcher; clones share buckets and cooldown.
pub struct RequestDispatcher<H: HttpTransport = ReqwestTransport> {
    inner: Arc<DispatcherInner<H>>,
}

impl<H: HttpTransport> Clone for RequestDispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RequestDispatcher<ReqwestTransport> {
    /// Build a dispatcher over `reqwest`. Must be called inside a tokio runtime.
    pub fn new(config: RestConfig) -> RestResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Self::with_transport(config, transport)
    }
}

impl<H: HttpTransport> RequestDispatcher<H> {
    /// Build a dispatcher over any transport. Must be called inside a tokio runtime.
    pub fn with_transport(config: RestConfig, transport: H) -> RestResult<Self> {
        let base_url = config.validate()?;

        let mut default_headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&config.credential.authorization())
            .map_err(|_| ConfigError::MalformedCredential)?;
        authorization.set_sensitive(true);
        default_headers.insert(AUTHORIZATION, authorization);
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|err| {
                ConfigError::InvalidSetting {
                    name: "user_agent",
                    reason: err.to_string(),
                }
            })?,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(DispatcherInner {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            registry: BucketRegistry::new(config.observer.clone()),
            config,
            default_headers,
            transport,
            cooldown: GlobalCooldown::new(),
            shutdown_tx,
            shutdown_rx,
            sweep_task: Mutex::new(None),
        });

        let sweep = spawn_sweep(Arc::downgrade(&inner));
        *inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(sweep);

        Ok(Self { inner })
    }

    pub fn registry(&self) -> &BucketRegistry {
        &self.inner.registry
    }

    /// Instant before which no request is admitted, if a cooldown is active.
    pub fn cooldown_until(&self) -> Option<Instant> {
        self.inner.cooldown.pending(Instant::now())
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown_rx.borrow()
    }

    /// Cancel every pending delay and in-flight transmission.
    ///
    /// Waiting requests resolve with [`RestError::Cancelled`]; later calls fail fast.
    pub fn stop(&self) {
        if self.inner.shutdown_tx.send_replace(true) {
            return;
        }
        if let Some(task) = self
            .inner
            .sweep_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        info!("request dispatcher stopped");
    }

    /// Submit one logical request and wait for its terminal outcome.
    pub async fn dispatch(
        &self,
        method: Method,
        route: &Route,
        body: Option<Bytes>,
    ) -> RestResult<HttpResponse> {
        if self.is_stopped() {
            return Err(RestError::Cancelled);
        }

        let inner = &self.inner;
        let mut pending = PendingRequest {
            route_key: route.bucket_key(&method),
            major_key: route.major_key(),
            url: format!("{}{}", inner.base_url, route.path()?),
            method,
            body,
            attempt: 0,
            transient_failures: 0,
            first_attempted_at: None,
        };
        let mut shutdown = inner.shutdown_rx.clone();

        loop {
            if let Some(until) = inner.cooldown.pending(Instant::now()) {
                debug!(
                    route = %pending.route_key,
                    wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "waiting for global cooldown"
                );
                pause_until(until, &mut shutdown).await?;
                // A newer cooldown may have been engaged while asleep.
                continue;
            }

            if let Admission::WaitUntil(until) =
                inner.registry.admit(&pending.route_key, Instant::now())
            {
                debug!(
                    route = %pending.route_key,
                    wait_ms = until.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "quota exhausted locally, delaying"
                );
                pause_until(until, &mut shutdown).await?;
                continue;
            }

            pending.attempt = pending.attempt.saturating_add(1);
            pending.first_attempted_at.get_or_insert_with(Instant::now);
            let request = pending.to_http(&inner.default_headers);
            debug!(
                method = %pending.method,
                route = %pending.route_key,
                attempt = pending.attempt,
                "transmitting request"
            );

            let outcome = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Err(RestError::Cancelled),
                outcome = inner.transport.execute(request) => outcome,
            };

            let response = match outcome {
                Ok(response) => response,
                Err(err) if err.is_transient() => {
                    self.retry_transient(&mut pending, err.to_string(), &mut shutdown)
                        .await?;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let now = Instant::now();
            let quota = QuotaHeaders::from_headers(&response.headers);
            inner
                .registry
                .update(&pending.route_key, &pending.major_key, &quota, now);

            let status = response.status;
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let violation =
                    QuotaViolation::from_response(&quota, &ErrorBody::parse(&response.body));
                self.handle_violation(&pending, violation, now, &mut shutdown)
                    .await?;
                continue;
            }

            if status.is_server_error() {
                let reason = format!("server error {status}");
                self.retry_transient(&mut pending, reason, &mut shutdown)
                    .await?;
                continue;
            }

            let body = ErrorBody::parse(&response.body);
            debug!(
                route = %pending.route_key,
                status = status.as_u16(),
                code = body.code,
                "request rejected"
            );
            return Err(RestError::Http {
                status,
                code: body.code,
                message: body.message.unwrap_or_else(|| response.body_text()),
            });
        }
    }

    /// [`dispatch`](Self::dispatch) and decode the success body as JSON.
    pub async fn dispatch_json<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &Route,
        body: Option<Bytes>,
    ) -> RestResult<T> {
        let response = self.dispatch(method, route, body).await?;
        sonic_rs::from_slice(&response.body).map_err(|err| RestError::Decode(err.to_string()))
    }

    async fn handle_violation(
        &self,
        pending: &PendingRequest,
        violation: QuotaViolation,
        now: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RestResult<()> {
        let inner = &self.inner;
        let ceiling = inner.config.max_retry_after;
        if violation.retry_after > ceiling {
            warn!(
                route = %pending.route_key,
                retry_after_ms = violation.retry_after.as_millis() as u64,
                ceiling_ms = ceiling.as_millis() as u64,
                "server retry delay above ceiling, giving up"
            );
            return Err(RestError::RetryAfterTooLong {
                retry_after: violation.retry_after,
                ceiling,
            });
        }

        warn!(
            route = %pending.route_key,
            attempt = pending.attempt,
            scope = ?violation.scope,
            retry_after_ms = violation.retry_after.as_millis() as u64,
            elapsed_ms = pending.elapsed_ms(),
            "quota violation reported by server"
        );
        if let Some(observer) = inner.config.observer.as_ref() {
            observer.request_retried(&pending.route_key, pending.attempt, "quota violation");
        }

        let until = now + violation.retry_after;
        if violation.is_global() {
            inner.cooldown.engage(until);
            if let Some(observer) = inner.config.observer.as_ref() {
                observer.cooldown_engaged(violation.retry_after);
            }
            // The loop waits on the cooldown itself.
            return Ok(());
        }
        pause_until(until, shutdown).await
    }

    async fn retry_transient(
        &self,
        pending: &mut PendingRequest,
        reason: String,
        shutdown: &mut watch::Receiver<bool>,
    ) -> RestResult<()> {
        let config = &self.inner.config;
        pending.transient_failures = pending.transient_failures.saturating_add(1);
        if pending.transient_failures >= config.transient_attempts {
            warn!(
                route = %pending.route_key,
                attempts = pending.transient_failures,
                error = %reason,
                "transient retry budget exhausted"
            );
            return Err(RestError::TransportExhausted {
                attempts: pending.transient_failures,
                last_error: reason,
            });
        }

        let delay = config
            .transient_backoff
            .saturating_mul(pending.transient_failures);
        debug!(
            route = %pending.route_key,
            attempt = pending.attempt,
            delay_ms = delay.as_millis() as u64,
            error = %reason,
            "transient failure, retrying"
        );
        if let Some(observer) = config.observer.as_ref() {
            observer.request_retried(&pending.route_key, pending.attempt, &reason);
        }
        pause_until(Instant::now() + delay, shutdown).await
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn pause_until(until: Instant, shutdown: &mut watch::Receiver<bool>) -> RestResult<()> {
    tokio::select! {
        biased;
        _ = stopped(shutdown) => Err(RestError::Cancelled),
        _ = tokio::time::sleep_until(until) => Ok(()),
    }
}

fn spawn_sweep<H: HttpTransport>(inner: Weak<DispatcherInner<H>>) -> JoinHandle<()> {
    let Some(strong) = inner.upgrade() else {
        return tokio::spawn(async {});
    };
    let interval = strong.config.sweep_interval;
    let mut shutdown = strong.shutdown_rx.clone();
    drop(strong);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                _ = ticker.tick() => {
                    let Some(strong) = inner.upgrade() else { break };
                    strong.registry.sweep(Instant::now());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn cooldown_only_moves_forward() {
        let cooldown = GlobalCooldown::new();
        let now = Instant::now();
        assert_eq!(cooldown.pending(now), None);

        cooldown.engage(now + Duration::from_secs(5));
        cooldown.engage(now + Duration::from_secs(2));
        let until = cooldown.pending(now).expect("cooldown active");
        assert!(until >= now + Duration::from_secs(5));
        assert_eq!(cooldown.pending(until), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_rounds_up_to_whole_millis() {
        let cooldown = GlobalCooldown::new();
        let now = Instant::now();
        let target = now + Duration::from_micros(1_500);
        cooldown.engage(target);
        let until = cooldown.pending(now).expect("cooldown active");
        assert!(until >= target);
    }
}
