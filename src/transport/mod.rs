use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{GatewayError, WebSocketBufferConfig, WsFrame, WsTlsConfig};

pub mod tungstenite;

pub type ConnectFuture<R, W> =
    Pin<Box<dyn Future<Output = Result<(R, W), GatewayError>> + Send>>;

/// Transport boundary for gateway socket IO.
///
/// The read loop runs outside kameo; the session actor owns protocol state and
/// only sees [`WsFrame`]s. Tests swap in [`crate::testing::MockTransport`].
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, GatewayError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
        tls: WsTlsConfig,
    ) -> ConnectFuture<Self::Reader, Self::Writer>;
}
