use futures_util::{Sink, SinkExt};
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage};
use tokio::sync::watch;
use tracing::debug;

use crate::core::{GatewayError, GatewayResult, WsFrame};
use crate::supervision::LinkSupervisor;

/// Owns the socket write half and serializes outbound frames.
///
/// One writer per connection; it refuses writes once its connection's
/// shutdown flag is raised so nothing is sent on a socket being torn down.
pub struct GatewayWriter<W>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
    frames_sent: u64,
}

impl<W> GatewayWriter<W>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    pub fn new(writer: W, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            writer,
            shutdown_rx,
            frames_sent: 0,
        }
    }
}

impl<W> Actor for GatewayWriter<W>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    type Args = Self;
    type Error = GatewayError;

    fn name() -> &'static str {
        "GatewayWriter"
    }

    async fn on_start(args: Self::Args, _ctx: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "GatewayWriter panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

#[derive(Debug)]
pub struct WriterWrite {
    pub frame: WsFrame,
}

impl<W> KameoMessage<WriterWrite> for GatewayWriter<W>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    type Reply = GatewayResult<()>;

    async fn handle(
        &mut self,
        msg: WriterWrite,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        if *self.shutdown_rx.borrow() {
            return Err(GatewayError::InvalidState("writer stopped".to_string()));
        }
        self.writer.send(msg.frame).await?;
        self.frames_sent = self.frames_sent.saturating_add(1);
        debug!(target: "gateway-writer", frames_sent = self.frames_sent, "frame written");
        Ok(())
    }
}

/// Send a close frame and shut the write half. Allowed after shutdown.
#[derive(Clone, Copy, Debug)]
pub struct WriterClose {
    pub code: u16,
    pub reason: &'static str,
}

impl<W> KameoMessage<WriterClose> for GatewayWriter<W>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    type Reply = GatewayResult<()>;

    async fn handle(
        &mut self,
        msg: WriterClose,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        debug!(target: "gateway-writer", code = msg.code, reason = msg.reason, "closing socket");
        self.writer
            .send(WsFrame::close(msg.code, msg.reason.as_bytes()))
            .await?;
        self.writer.close().await
    }
}

/// Spawn a writer for a fresh connection and link it under `supervisor`.
pub async fn spawn_writer_supervised<W>(
    supervisor: &ActorRef<LinkSupervisor<GatewayWriter<W>>>,
    writer: W,
    shutdown_rx: watch::Receiver<bool>,
) -> ActorRef<GatewayWriter<W>>
where
    W: Sink<WsFrame, Error = GatewayError> + Send + Sync + Unpin + 'static,
{
    let actor = GatewayWriter::spawn(GatewayWriter::new(writer, shutdown_rx));
    actor.link(supervisor).await;
    actor
}
