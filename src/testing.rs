//! In-memory transports for driving the gateway actor and the request
//! dispatcher deterministically.
//!
//! [`MockTransport`] hands every connection attempt to a [`MockServer`] as a
//! [`MockConnection`], so tests can play the server across reconnects.
//! [`MockHttp`] answers requests from a closure and records when each one was
//! transmitted.

use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Sink;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::{GatewayError, WebSocketBufferConfig, WsCloseFrame, WsFrame, WsTlsConfig};
use crate::gateway::envelope::{Envelope, decode_envelope};
use crate::rest::{HttpFuture, HttpRequest, HttpResponse, HttpTransport, RestResult};
use crate::transport::{ConnectFuture, WsTransport};

/// Websocket transport backed by in-memory channels.
#[derive(Clone)]
pub struct MockTransport {
    connections_tx: mpsc::UnboundedSender<MockConnection>,
    refusals: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Build a transport and the server handle that accepts its connections.
    pub fn channel_pair() -> (Self, MockServer) {
        let (connections_tx, connections_rx) = mpsc::unbounded_channel();
        let refusals = Arc::new(AtomicUsize::new(0));
        let urls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                connections_tx,
                refusals: Arc::clone(&refusals),
                urls: Arc::clone(&urls),
            },
            MockServer {
                connections_rx,
                refusals,
                urls,
            },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: WebSocketBufferConfig,
        _tls: WsTlsConfig,
    ) -> ConnectFuture<Self::Reader, Self::Writer> {
        let connections_tx = self.connections_tx.clone();
        let refusals = Arc::clone(&self.refusals);
        let urls = Arc::clone(&self.urls);
        Box::pin(async move {
            urls.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(url.clone());

            let refused = refusals
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(GatewayError::ConnectionFailed(format!(
                    "mock refused connection to {url}"
                )));
            }

            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            connections_tx
                .send(MockConnection {
                    url,
                    outbound_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| GatewayError::ConnectionFailed("mock server dropped".to_string()))?;
            Ok((MockReader { rx: inbound_rx }, MockWriter { tx: outbound_tx }))
        })
    }
}

/// Error surface for pushing frames through a [`MockConnection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The server side already dropped this socket.
    SocketDropped,
    /// The client side stopped reading.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client stopped reading"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server side of a [`MockTransport`].
pub struct MockServer {
    connections_rx: mpsc::UnboundedReceiver<MockConnection>,
    refusals: Arc<AtomicUsize>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    /// Wait for the client's next connection.
    pub async fn accept(&mut self) -> Option<MockConnection> {
        self.connections_rx.recv().await
    }

    pub async fn accept_timeout(&mut self, timeout: Duration) -> Option<MockConnection> {
        tokio::time::timeout(timeout, self.connections_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.store(n, Ordering::Release);
    }

    /// Every address the client dialled, refused attempts included.
    pub fn connect_urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// One accepted socket, seen from the server.
pub struct MockConnection {
    url: String,
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockConnection {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame the client wrote; `None` once its writer is gone.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    /// Next data frame the client wrote, decoded. `None` on close or hang-up.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.outbound_rx.recv().await? {
                WsFrame::Text(bytes) | WsFrame::Binary(bytes) => {
                    return decode_envelope(&bytes).ok();
                }
                WsFrame::Close(_) => return None,
                _ => continue,
            }
        }
    }

    /// Skip data frames until the client's close frame arrives.
    pub async fn recv_close(&mut self) -> Option<WsCloseFrame> {
        loop {
            if let WsFrame::Close(frame) = self.outbound_rx.recv().await? {
                return frame;
            }
        }
    }

    pub fn send_frame(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    pub fn send_json(&self, json: impl Into<String>) -> Result<(), MockServerError> {
        self.send_frame(WsFrame::Text(Bytes::from(json.into())))
    }

    /// Deliver one message split into `pieces` continuation fragments.
    pub fn send_fragmented(
        &self,
        json: impl AsRef<str>,
        pieces: usize,
    ) -> Result<(), MockServerError> {
        let bytes = json.as_ref().as_bytes();
        let chunk = bytes.len().div_ceil(pieces.max(1)).max(1);
        let mut chunks = bytes.chunks(chunk).peekable();
        while let Some(part) = chunks.next() {
            let fin = chunks.peek().is_none();
            self.send_frame(WsFrame::fragment(Bytes::copy_from_slice(part), fin))?;
        }
        Ok(())
    }

    pub fn send_hello(&self, heartbeat_interval_ms: u64) -> Result<(), MockServerError> {
        self.send_json(format!(
            r#"{{"op":10,"d":{{"heartbeat_interval":{heartbeat_interval_ms}}}}}"#
        ))
    }

    pub fn send_ready(
        &self,
        seq: u64,
        session_id: &str,
        resume_url: &str,
    ) -> Result<(), MockServerError> {
        self.send_json(format!(
            r#"{{"op":0,"s":{seq},"t":"READY","d":{{"session_id":"{session_id}","resume_gateway_url":"{resume_url}"}}}}"#
        ))
    }

    pub fn send_dispatch(&self, seq: u64, event: &str) -> Result<(), MockServerError> {
        self.send_json(format!(r#"{{"op":0,"s":{seq},"t":"{event}","d":{{}}}}"#))
    }

    pub fn send_heartbeat_ack(&self) -> Result<(), MockServerError> {
        self.send_json(r#"{"op":11}"#)
    }

    /// Send a close frame, then hang up.
    pub fn close(&mut self, code: u16, reason: &'static str) {
        let _ = self.send_frame(WsFrame::close(code, reason.as_bytes()));
        self.inbound_tx = None;
    }

    /// Hang up without a close frame.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = GatewayError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .tx
            .send(item)
            .map_err(|_| GatewayError::TransportError {
                context: "mock_transport_write",
                error: "mock server hung up".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// One transmission seen by [`MockHttp`].
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub at: Instant,
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

type Responder = dyn Fn(&HttpRequest, u32) -> RestResult<HttpResponse> + Send + Sync;

/// HTTP transport answered by a closure.
///
/// The closure receives each request and its zero-based transmission index.
#[derive(Clone)]
pub struct MockHttp {
    responder: Arc<Responder>,
    latency: Duration,
    calls: Arc<AtomicU32>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttp {
    pub fn new(
        responder: impl Fn(&HttpRequest, u32) -> RestResult<HttpResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Arc::new(responder),
            latency: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request succeeds with an empty JSON object.
    pub fn always_ok() -> Self {
        Self::new(|_, _| Ok(mock_response(200, &[], "{}")))
    }

    /// Delay every response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> u32 {
        self.calls.load(Ordering::Acquire)
    }
}

impl HttpTransport for MockHttp {
    fn execute(&self, request: HttpRequest) -> HttpFuture {
        let index = self.calls.fetch_add(1, Ordering::AcqRel);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                at: Instant::now(),
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
            });
        let result = (self.responder)(&request, index);
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }
}

/// Build a response with the given status, headers and body.
///
/// Header names must be lowercase.
pub fn mock_response(status: u16, headers: &[(&'static str, &str)], body: &str) -> HttpResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        if let Ok(value) = HeaderValue::from_str(value) {
            map.insert(HeaderName::from_static(name), value);
        }
    }
    HttpResponse {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        headers: map,
        body: Bytes::copy_from_slice(body.as_bytes()),
    }
}
