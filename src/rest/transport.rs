use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};

use super::error::{RestError, RestResult};
use crate::core::ConfigError;

/// One physical transmission.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub type HttpFuture = Pin<Box<dyn Future<Output = RestResult<HttpResponse>> + Send>>;

/// Synchronous request/response exchange used by the dispatcher.
///
/// Implementations report connection-level failures as [`RestError::Transport`];
/// any response the server produced, whatever its status, is `Ok`.
pub trait HttpTransport: Clone + Send + Sync + 'static {
    fn execute(&self, request: HttpRequest) -> HttpFuture;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> RestResult<Self> {
        crate::tls::install_rustls_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| client_setup_failed(err.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// A client that cannot be built never will be; retrying is pointless.
fn client_setup_failed(reason: String) -> RestError {
    RestError::InvalidConfig(ConfigError::InvalidSetting {
        name: "http_client",
        reason,
    })
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: HttpRequest) -> HttpFuture {
        let client = self.client.clone();
        Box::pin(async move {
            let mut builder = client
                .request(request.method, &request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| RestError::Transport(err.to_string()))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| RestError::Transport(err.to_string()))?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_setup_failure_is_not_retried() {
        let err = client_setup_failed("no TLS backend".to_string());
        assert!(!err.is_transient());
        assert!(matches!(
            err,
            RestError::InvalidConfig(ConfigError::InvalidSetting {
                name: "http_client",
                ..
            })
        ));
    }

    #[test]
    fn connection_failures_are_retried() {
        assert!(RestError::Transport("connection reset".to_string()).is_transient());
    }
}
