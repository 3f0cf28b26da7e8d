use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Sink, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{
        Message as TungsteniteMessage, Utf8Bytes,
        protocol::{CloseFrame as TungCloseFrame, WebSocketConfig},
    },
};

use crate::core::{GatewayError, WebSocketBufferConfig, WsCloseFrame, WsFrame, WsTlsConfig};
use crate::tls::{insecure_client_config, install_rustls_crypto_provider};
use crate::transport::{ConnectFuture, WsTransport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn map_ws_error(context: &'static str, err: impl ToString) -> GatewayError {
    GatewayError::TransportError {
        context,
        error: err.to_string(),
    }
}

fn close_to_core(frame: Option<TungCloseFrame>) -> Option<WsCloseFrame> {
    frame.map(|f| WsCloseFrame {
        code: u16::from(f.code),
        reason: AsRef::<Bytes>::as_ref(&f.reason).clone(),
    })
}

fn core_to_close(frame: WsCloseFrame) -> TungCloseFrame {
    // Close reasons must be UTF-8; anything else is dropped rather than sent.
    let reason = Utf8Bytes::try_from(frame.reason).unwrap_or_else(|_| Utf8Bytes::from_static(""));
    TungCloseFrame {
        code: frame.code.into(),
        reason,
    }
}

fn msg_to_frame(msg: TungsteniteMessage) -> WsFrame {
    match msg {
        TungsteniteMessage::Text(text) => WsFrame::Text(AsRef::<Bytes>::as_ref(&text).clone()),
        TungsteniteMessage::Binary(bytes) => WsFrame::Binary(bytes),
        TungsteniteMessage::Ping(bytes) => WsFrame::Ping(bytes),
        TungsteniteMessage::Pong(bytes) => WsFrame::Pong(bytes),
        TungsteniteMessage::Close(frame) => WsFrame::Close(close_to_core(frame)),
        TungsteniteMessage::Frame(frame) => WsFrame::Fragment {
            payload: Bytes::copy_from_slice(frame.payload()),
            fin: frame.header().is_final,
        },
    }
}

fn frame_to_msg(frame: WsFrame) -> TungsteniteMessage {
    match frame {
        WsFrame::Text(bytes) => match Utf8Bytes::try_from(bytes.clone()) {
            Ok(text) => TungsteniteMessage::Text(text),
            Err(_) => TungsteniteMessage::Binary(bytes),
        },
        WsFrame::Binary(bytes) | WsFrame::Fragment { payload: bytes, .. } => {
            TungsteniteMessage::Binary(bytes)
        }
        WsFrame::Ping(bytes) => TungsteniteMessage::Ping(bytes),
        WsFrame::Pong(bytes) => TungsteniteMessage::Pong(bytes),
        WsFrame::Close(frame) => TungsteniteMessage::Close(frame.map(core_to_close)),
    }
}

/// tokio-tungstenite socket with rustls.
#[derive(Clone, Default)]
pub struct TungsteniteTransport {
    connector: Option<Connector>,
}

impl TungsteniteTransport {
    pub fn with_connector(connector: Connector) -> Self {
        Self {
            connector: Some(connector),
        }
    }

    pub fn rustls(config: Arc<rustls::ClientConfig>) -> Self {
        Self::with_connector(Connector::Rustls(config))
    }
}

pub struct TungsteniteReader {
    inner: futures_util::stream::SplitStream<Socket>,
}

impl Stream for TungsteniteReader {
    type Item = Result<WsFrame, GatewayError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|item| {
            item.map(|res| res.map(msg_to_frame).map_err(|e| map_ws_error("read", e)))
        })
    }
}

pub struct TungsteniteWriter {
    inner: futures_util::stream::SplitSink<Socket, TungsteniteMessage>,
}

impl Sink<WsFrame> for TungsteniteWriter {
    type Error = GatewayError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn start_send(mut self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        Pin::new(&mut self.inner)
            .start_send(frame_to_msg(item))
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(|e| map_ws_error("write", e))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(|e| map_ws_error("close", e))
    }
}

impl WsTransport for TungsteniteTransport {
    type Reader = TungsteniteReader;
    type Writer = TungsteniteWriter;

    fn connect(
        &self,
        url: String,
        buffers: WebSocketBufferConfig,
        tls: WsTlsConfig,
    ) -> ConnectFuture<Self::Reader, Self::Writer> {
        let connector = match (&self.connector, tls.validate_certs) {
            (Some(connector), _) => Some(connector.clone()),
            (None, false) => Some(Connector::Rustls(insecure_client_config())),
            (None, true) => None,
        };
        Box::pin(async move {
            install_rustls_crypto_provider();

            let mut config = WebSocketConfig::default();
            config.max_message_size = Some(buffers.max_message_bytes);
            config.max_frame_size = Some(buffers.max_frame_bytes);
            config.write_buffer_size = buffers.write_buffer_bytes;
            config.max_write_buffer_size = buffers.max_write_buffer_bytes;

            let (stream, _) = connect_async_tls_with_config(url, Some(config), true, connector)
                .await
                .map_err(|e| map_ws_error("connect", e))?;

            let (write, read) = stream.split();
            Ok((
                TungsteniteReader { inner: read },
                TungsteniteWriter { inner: write },
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_is_shared_not_copied() {
        let text = Utf8Bytes::from_static(r#"{"op":11}"#);
        let backing = AsRef::<Bytes>::as_ref(&text).clone();

        let WsFrame::Text(bytes) = msg_to_frame(TungsteniteMessage::Text(text)) else {
            panic!("expected text frame");
        };
        assert_eq!(bytes, backing);
        assert_eq!(bytes.as_ptr(), backing.as_ptr());
    }

    #[test]
    fn close_frames_keep_code_and_reason() {
        let frame = frame_to_msg(WsFrame::close(4000, "reconnecting"));
        let TungsteniteMessage::Close(Some(close)) = frame else {
            panic!("expected close message");
        };
        assert_eq!(u16::from(close.code), 4000);
        assert_eq!(close.reason.as_str(), "reconnecting");

        let back = msg_to_frame(TungsteniteMessage::Close(Some(close)));
        let WsFrame::Close(Some(core)) = back else {
            panic!("expected close frame");
        };
        assert_eq!(core.code, 4000);
        assert_eq!(core.reason_lossy(), "reconnecting");
    }

    #[test]
    fn invalid_utf8_text_goes_out_as_binary() {
        let frame = frame_to_msg(WsFrame::Text(Bytes::from_static(&[0xff, 0xfe])));
        assert!(matches!(frame, TungsteniteMessage::Binary(_)));
    }
}
