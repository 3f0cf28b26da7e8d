//! Gateway session actor.
//!
//! The socket read loop runs outside kameo; the actor owns the session state
//! machine, timers, the writer and the subscriber list. Everything a connection
//! produces is tagged with that connection's generation so frames, ticks and
//! timeouts from a torn-down socket are dropped instead of acted on.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use kameo::error::SendError;
use kameo::prelude::{Actor, ActorRef, Context, Message as KameoMessage, WeakActorRef};
use sonic_rs::Value;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::config::GatewayConfig;
use super::envelope::{Envelope, GatewayCommand, Opcode};
use super::events::{EventStream, EventSurface};
use super::reader::{FrameOutcome, FrameReader};
use super::session::{
    CLOSE_NORMAL, CLOSE_RESUMABLE, GatewaySession, HandshakeParams, ReconnectPlan,
    SessionCommand, SessionSnapshot, SessionState,
};
use super::writer::{GatewayWriter, WriterClose, WriterWrite, spawn_writer_supervised};
use crate::core::{
    ConnectionStats, GatewayError, GatewayResult, LinearBackoffReconnect, WsDisconnectAction,
    WsDisconnectCause, WsFrame, WsHealthMonitor, WsRateLimiter, WsReconnectStrategy,
    jitter_delay,
};
use crate::observer::ObserverHook;
use crate::supervision::LinkSupervisor;
use crate::transport::WsTransport;
use crate::transport::tungstenite::TungsteniteTransport;

/// Arguments for constructing a gateway actor.
pub struct GatewayArgs<T = TungsteniteTransport, R = LinearBackoffReconnect>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    pub config: GatewayConfig,
    pub transport: T,
    pub reconnect: R,
}

/// One logical gateway session, kept alive across reconnects.
pub struct GatewayActor<T = TungsteniteTransport, R = LinearBackoffReconnect>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    config: GatewayConfig,
    initial_url: String,
    label: String,
    transport: T,
    reconnect: R,
    session: GatewaySession,
    health: WsHealthMonitor,
    limiter: WsRateLimiter,
    events: EventSurface,
    observer: Option<ObserverHook>,
    actor_ref: ActorRef<Self>,
    generation: u64,
    reconnect_attempt: u64,
    fatal: Option<String>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    hello_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    writer_ref: Option<ActorRef<GatewayWriter<T::Writer>>>,
    writer_supervisor_ref: Option<ActorRef<LinkSupervisor<GatewayWriter<T::Writer>>>>,
}

impl<T, R> Actor for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Args = GatewayArgs<T, R>;
    type Error = GatewayError;

    fn name() -> &'static str {
        "GatewayActor"
    }

    async fn on_start(args: Self::Args, ctx: ActorRef<Self>) -> GatewayResult<Self> {
        let GatewayArgs {
            config,
            transport,
            reconnect,
        } = args;
        config.validate()?;

        let session = GatewaySession::new(HandshakeParams {
            credential: config.credential.clone(),
            intents: config.intents,
            properties: config.properties.clone(),
            large_threshold: config.large_threshold,
            invalid_session_delay_min: config.invalid_session_delay_min,
            invalid_session_delay_max: config.invalid_session_delay_max,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            initial_url: config.url.clone(),
            label: config.connection_label(),
            limiter: WsRateLimiter::new(config.command_limit, config.command_window),
            observer: config.observer.clone(),
            config,
            transport,
            reconnect,
            session,
            health: WsHealthMonitor::new(),
            events: EventSurface::default(),
            actor_ref: ctx,
            generation: 0,
            reconnect_attempt: 0,
            fatal: None,
            reader_task: None,
            heartbeat_task: None,
            hello_task: None,
            reconnect_task: None,
            shutdown_tx,
            shutdown_rx,
            writer_ref: None,
            writer_supervisor_ref: None,
        })
    }

    async fn on_stop(
        &mut self,
        _ctx: WeakActorRef<Self>,
        _reason: kameo::error::ActorStopReason,
    ) -> GatewayResult<()> {
        self.session.stop();
        abort_task(&mut self.reconnect_task);
        self.shutdown_connection(CLOSE_NORMAL).await;
        Ok(())
    }

    fn on_panic(
        &mut self,
        _actor_ref: kameo::actor::WeakActorRef<Self>,
        err: kameo::prelude::PanicError,
    ) -> impl std::future::Future<
        Output = Result<std::ops::ControlFlow<kameo::prelude::ActorStopReason>, Self::Error>,
    > + Send {
        async move {
            tracing::error!(error = ?err, "GatewayActor panicked");
            Ok(std::ops::ControlFlow::Break(
                kameo::prelude::ActorStopReason::Panicked(err),
            ))
        }
    }
}

/// Control and IO events processed by the gateway actor.
#[derive(Debug)]
pub enum GatewayEvent {
    /// Open the first connection. Ignored unless the session is stopped.
    Start,
    /// Close the socket and forget the session.
    Stop,
    /// Drop the connection and resume on a fresh one.
    RequestReconnect,
    Connect {
        generation: u64,
    },
    Inbound {
        generation: u64,
        envelope: Envelope,
    },
    Disconnect {
        generation: u64,
        cause: WsDisconnectCause,
    },
    HeartbeatTick {
        generation: u64,
    },
    HelloTimeout {
        generation: u64,
    },
}

impl<T, R> KameoMessage<GatewayEvent> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, event: GatewayEvent, _ctx: &mut Context<Self, Self::Reply>) {
        match event {
            GatewayEvent::Start => self.handle_start(),
            GatewayEvent::Stop => self.handle_stop().await,
            GatewayEvent::RequestReconnect => self.handle_reconnect_request().await,
            GatewayEvent::Connect { generation } => {
                if generation == self.generation
                    && self.session.state() == SessionState::Reconnecting
                {
                    self.connect_now();
                }
            }
            GatewayEvent::Inbound {
                generation,
                envelope,
            } => {
                if generation == self.generation {
                    self.process_inbound(envelope).await;
                }
            }
            GatewayEvent::Disconnect { generation, cause } => {
                if generation == self.generation {
                    self.handle_disconnect(cause).await;
                }
            }
            GatewayEvent::HeartbeatTick { generation } => {
                if generation == self.generation {
                    let commands = self.session.heartbeat_tick(Instant::now());
                    self.execute(commands).await;
                }
            }
            GatewayEvent::HelloTimeout { generation } => {
                if generation == self.generation
                    && let Some(command) = self.session.hello_timed_out()
                {
                    warn!(
                        connection = %self.label,
                        timeout_ms = self.config.hello_timeout.as_millis() as u64,
                        "no hello from gateway"
                    );
                    if let Some(observer) = self.observer.as_ref() {
                        observer.protocol_violation(&self.label, "no hello within timeout");
                    }
                    self.execute(vec![command]).await;
                }
            }
        }
    }
}

pub(crate) struct ConnectionEstablished<T: WsTransport> {
    generation: u64,
    reader: T::Reader,
    writer: T::Writer,
}

pub(crate) struct ConnectionFailed {
    generation: u64,
    error: GatewayError,
}

impl<T, R> KameoMessage<ConnectionEstablished<T>> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(
        &mut self,
        msg: ConnectionEstablished<T>,
        _ctx: &mut Context<Self, Self::Reply>,
    ) {
        if msg.generation != self.generation || self.session.state() != SessionState::Connecting {
            debug!(connection = %self.label, generation = msg.generation, "discarding stale connection");
            return;
        }
        self.on_connection_established(msg.reader, msg.writer).await;
    }
}

impl<T, R> KameoMessage<ConnectionFailed> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = ();

    async fn handle(&mut self, msg: ConnectionFailed, _ctx: &mut Context<Self, Self::Reply>) {
        if msg.generation != self.generation || self.session.state() != SessionState::Connecting {
            return;
        }
        let message = msg.error.to_string();
        self.health.record_internal_error("connect", &message);
        let command = self
            .session
            .connection_lost(WsDisconnectCause::HandshakeFailed { message });
        self.execute(vec![command]).await;
    }
}

/// Register a new subscriber. The stream survives reconnects.
#[derive(Clone, Copy, Debug)]
pub struct Subscribe;

impl<T, R> KameoMessage<Subscribe> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = GatewayResult<EventStream>;

    async fn handle(&mut self, _msg: Subscribe, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.events.subscribe())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GetSessionSnapshot;

impl<T, R> KameoMessage<GetSessionSnapshot> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = GatewayResult<SessionSnapshot>;

    async fn handle(
        &mut self,
        _msg: GetSessionSnapshot,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.session.snapshot())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GetConnectionStats;

impl<T, R> KameoMessage<GetConnectionStats> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = GatewayResult<ConnectionStats>;

    async fn handle(
        &mut self,
        _msg: GetConnectionStats,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        Ok(self.health.get_stats())
    }
}

/// The error that ended the session, if the server refused it for good.
#[derive(Clone, Copy, Debug)]
pub struct GetFatalError;

impl<T, R> KameoMessage<GetFatalError> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = GatewayResult<Option<String>>;

    async fn handle(&mut self, _msg: GetFatalError, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        Ok(self.fatal.clone())
    }
}

/// Send a caller-owned gateway command (presence update, member request, ...).
///
/// Counted against the outbound command budget. Session-control and
/// server-only opcodes are refused.
#[derive(Clone, Debug)]
pub struct SendCommand {
    pub op: Opcode,
    pub d: Value,
}

impl<T, R> KameoMessage<SendCommand> for GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    type Reply = GatewayResult<()>;

    async fn handle(&mut self, msg: SendCommand, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if msg.op.is_session_control() || msg.op.is_server_only() {
            return Err(GatewayError::InvalidState(format!(
                "{:?} cannot be sent by callers",
                msg.op
            )));
        }
        if self.session.state() != SessionState::Connected {
            return Err(GatewayError::InvalidState(format!(
                "session is {:?}",
                self.session.state()
            )));
        }
        self.limiter.try_acquire()?;
        self.write_command(&GatewayCommand::Custom {
            op: msg.op,
            d: msg.d,
        })
        .await
    }
}

impl<T, R> GatewayActor<T, R>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    fn handle_start(&mut self) {
        if self.session.state() != SessionState::Disconnected {
            debug!(connection = %self.label, state = ?self.session.state(), "gateway already started");
            return;
        }
        self.fatal = None;
        self.connect_now();
    }

    async fn handle_stop(&mut self) {
        info!(connection = %self.label, "stopping gateway session");
        self.session.stop();
        abort_task(&mut self.reconnect_task);
        self.shutdown_connection(CLOSE_NORMAL).await;
    }

    async fn handle_reconnect_request(&mut self) {
        match self.session.state() {
            SessionState::AwaitingHello
            | SessionState::Identifying
            | SessionState::Resuming
            | SessionState::Connected => {
                let command = self.session.request_reconnect();
                self.execute(vec![command]).await;
            }
            state => {
                debug!(connection = %self.label, state = ?state, "no live connection to recycle");
            }
        }
    }

    fn connect_now(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let resume = self.session.can_resume();
        let target = self.session.begin_connect(&self.initial_url).to_string();
        self.session.mark_connecting();

        let url = match self.config.connect_url(&target) {
            Ok(url) => url,
            Err(err) => {
                warn!(connection = %self.label, url = %target, error = %err, "unusable gateway address");
                match self.config.connect_url(&self.initial_url) {
                    Ok(url) => url,
                    Err(err) => {
                        self.session.stop();
                        self.fatal = Some(err.to_string());
                        return;
                    }
                }
            }
        };

        info!(connection = %self.label, url = %url, generation, resume, "connecting to gateway");

        let actor_ref = self.actor_ref.clone();
        let transport = self.transport.clone();
        let buffers = self.config.buffers;
        let tls = self.config.tls;
        tokio::spawn(async move {
            match transport.connect(url, buffers, tls).await {
                Ok((reader, writer)) => {
                    let _ = actor_ref
                        .tell(ConnectionEstablished::<T> {
                            generation,
                            reader,
                            writer,
                        })
                        .send()
                        .await;
                }
                Err(error) => {
                    let _ = actor_ref
                        .tell(ConnectionFailed { generation, error })
                        .send()
                        .await;
                }
            }
        });
    }

    async fn on_connection_established(&mut self, reader: T::Reader, writer: T::Writer) {
        info!(connection = %self.label, generation = self.generation, "gateway socket open");
        self.health.reset();
        self.session.connection_opened();

        let supervisor = self
            .writer_supervisor_ref
            .get_or_insert_with(|| LinkSupervisor::spawn_named("gateway-writer"));
        let writer = spawn_writer_supervised(supervisor, writer, self.shutdown_rx.clone()).await;
        self.writer_ref = Some(writer);

        self.start_reader(reader);

        let generation = self.generation;
        let hello_timeout = self.config.hello_timeout;
        let actor_ref = self.actor_ref.clone();
        self.hello_task = Some(tokio::spawn(async move {
            tokio::time::sleep(hello_timeout).await;
            let _ = actor_ref
                .tell(GatewayEvent::HelloTimeout { generation })
                .send()
                .await;
        }));
    }

    fn start_reader(&mut self, mut read: T::Reader) {
        let generation = self.generation;
        let mut shutdown = self.shutdown_rx.clone();
        let actor_ref = self.actor_ref.clone();
        let label = self.label.clone();
        let mut frames = FrameReader::new(self.config.buffers.max_message_bytes);

        self.reader_task = Some(tokio::spawn(async move {
            loop {
                let cause = tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow_and_update() { break; }
                        continue;
                    }
                    next = read.next() => match next {
                        Some(Ok(frame)) => match frames.on_frame(frame) {
                            FrameOutcome::Pending | FrameOutcome::Control => continue,
                            FrameOutcome::Envelope(envelope) => {
                                if actor_ref
                                    .tell(GatewayEvent::Inbound { generation, envelope })
                                    .send()
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                continue;
                            }
                            FrameOutcome::Closed(frame) => {
                                info!(connection = %label, close = ?frame, "gateway sent close frame");
                                WsDisconnectCause::RemoteClosed {
                                    code: frame.as_ref().map(|f| f.code),
                                    reason: frame.map(|f| f.reason_lossy()).unwrap_or_default(),
                                }
                            }
                            FrameOutcome::Violation(reason) => {
                                WsDisconnectCause::ProtocolViolation { reason }
                            }
                        },
                        Some(Err(err)) => WsDisconnectCause::ReadFailure { error: err.to_string() },
                        None => WsDisconnectCause::StreamEnded,
                    }
                };
                let _ = actor_ref
                    .tell(GatewayEvent::Disconnect { generation, cause })
                    .send()
                    .await;
                break;
            }
        }));
    }

    fn start_heartbeat(&mut self, interval: Duration, initial_delay: Duration) {
        abort_task(&mut self.hello_task);
        abort_task(&mut self.heartbeat_task);

        let generation = self.generation;
        let mut shutdown = self.shutdown_rx.clone();
        let actor_ref = self.actor_ref.clone();
        debug!(
            connection = %self.label,
            interval_ms = interval.as_millis() as u64,
            initial_delay_ms = initial_delay.as_millis() as u64,
            "starting heartbeat"
        );

        self.heartbeat_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + initial_delay, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() { break; }
                    }
                    _ = ticker.tick() => {
                        if actor_ref
                            .tell(GatewayEvent::HeartbeatTick { generation })
                            .send()
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        }));
    }

    async fn process_inbound(&mut self, envelope: Envelope) {
        self.health.record_message();
        match self.session.handle(envelope, Instant::now()) {
            Ok(commands) => self.execute(commands).await,
            Err(err) => {
                let reason = match err {
                    GatewayError::ProtocolViolation(reason) => reason,
                    other => other.to_string(),
                };
                self.handle_disconnect(WsDisconnectCause::ProtocolViolation { reason })
                    .await;
            }
        }
    }

    async fn handle_disconnect(&mut self, cause: WsDisconnectCause) {
        match &cause {
            WsDisconnectCause::ProtocolViolation { reason } => {
                warn!(connection = %self.label, reason = %reason, "gateway protocol violation");
                self.health.record_internal_error("protocol", reason);
                if let Some(observer) = self.observer.as_ref() {
                    observer.protocol_violation(&self.label, reason);
                }
            }
            WsDisconnectCause::RemoteClosed { code, reason } => {
                self.health.record_server_error(*code, reason);
            }
            WsDisconnectCause::ReadFailure { error } => {
                self.health.record_internal_error("read", error);
            }
            _ => {}
        }
        let command = self.session.connection_lost(cause);
        self.execute(vec![command]).await;
    }

    /// Run session commands in order. A reconnect or abort ends the batch.
    async fn execute(&mut self, commands: Vec<SessionCommand>) {
        let mut queue = VecDeque::from(commands);
        while let Some(command) = queue.pop_front() {
            match command {
                SessionCommand::Send(command) => {
                    if let Err(err) = self.write_command(&command).await {
                        queue.clear();
                        queue.push_back(self.session.connection_lost(
                            WsDisconnectCause::WriterFailed {
                                error: err.to_string(),
                            },
                        ));
                    }
                }
                SessionCommand::StartHeartbeat {
                    interval,
                    initial_delay,
                } => self.start_heartbeat(interval, initial_delay),
                SessionCommand::HeartbeatAcked { rtt } => {
                    if let Some(rtt) = rtt {
                        self.health.record_rtt(rtt);
                    }
                }
                SessionCommand::Publish(envelope) => self.events.publish(envelope),
                SessionCommand::Ready { resumed } => {
                    self.reconnect.reset();
                    self.reconnect_attempt = 0;
                    info!(
                        connection = %self.label,
                        resumed,
                        session_id = self.session.session_id().unwrap_or_default(),
                        sequence = ?self.session.sequence(),
                        "gateway session ready"
                    );
                    if let Some(observer) = self.observer.as_ref() {
                        observer.session_ready(&self.label, resumed);
                    }
                }
                SessionCommand::Invalidated => {
                    if let Some(observer) = self.observer.as_ref() {
                        observer.session_invalidated(&self.label);
                    }
                }
                SessionCommand::Reconnect(plan) => {
                    queue.clear();
                    self.reconnect_with(plan).await;
                }
                SessionCommand::Abort(err) => {
                    queue.clear();
                    self.abort(err).await;
                }
            }
        }
    }

    async fn write_command(&mut self, command: &GatewayCommand) -> GatewayResult<()> {
        let op = command.opcode();
        let payload = command
            .encode()
            .map_err(|e| GatewayError::ProtocolViolation(format!("encoding {op:?}: {e}")))?;
        let writer = self
            .writer_ref
            .clone()
            .ok_or_else(|| GatewayError::InvalidState("no open connection".to_string()))?;

        debug!(connection = %self.label, op = ?op, bytes = payload.len(), "sending gateway command");
        let frame = WsFrame::Text(Bytes::from(payload));
        match writer.ask(WriterWrite { frame }).await {
            Ok(()) => {
                self.health.record_sent();
                Ok(())
            }
            Err(err) => {
                let err = match err {
                    SendError::HandlerError(err) => err,
                    _ => GatewayError::ActorError("gateway writer unavailable".to_string()),
                };
                self.health.record_internal_error("outbound", &err.to_string());
                warn!(connection = %self.label, op = ?op, error = %err, "gateway write failed");
                Err(err)
            }
        }
    }

    async fn reconnect_with(&mut self, plan: ReconnectPlan) {
        let close_code = if plan.resume {
            CLOSE_RESUMABLE
        } else {
            CLOSE_NORMAL
        };
        self.shutdown_connection(close_code).await;
        if let Some(observer) = self.observer.as_ref() {
            observer.reconnect_triggered(&self.label, plan.resume, &plan.cause.to_string());
        }
        self.schedule_reconnect(plan);
    }

    fn schedule_reconnect(&mut self, plan: ReconnectPlan) {
        if !self.reconnect.should_retry() {
            self.log_reconnect_plan("retry_suppressed", &plan, None);
            self.session.stop();
            self.fatal = Some(format!("reconnect suppressed after {}", plan.cause));
            return;
        }

        let delay = match plan.action {
            WsDisconnectAction::ImmediateReconnect => plan.min_delay,
            WsDisconnectAction::BackoffReconnect => {
                jitter_delay(self.reconnect.next_delay()).max(plan.min_delay)
            }
            WsDisconnectAction::Abort => {
                self.log_reconnect_plan("abort", &plan, None);
                self.session.stop();
                return;
            }
        };

        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.health.increment_reconnect();
        self.log_reconnect_plan("scheduled", &plan, Some(delay));

        abort_task(&mut self.reconnect_task);
        let generation = self.generation;
        let actor_ref = self.actor_ref.clone();
        self.reconnect_task = Some(tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = actor_ref
                .tell(GatewayEvent::Connect { generation })
                .send()
                .await;
        }));
    }

    async fn abort(&mut self, err: GatewayError) {
        error!(connection = %self.label, error = %err, "gateway session refused by server");
        self.health.record_internal_error("session", &err.to_string());
        self.shutdown_connection(CLOSE_NORMAL).await;
        self.fatal = Some(err.to_string());
        // Ends every subscriber stream; there is nothing more to deliver.
        self.events = EventSurface::default();
    }

    /// Tear down the current socket. Bumps the generation so anything still in
    /// flight from it is ignored.
    async fn shutdown_connection(&mut self, close_code: u16) {
        let _ = self.shutdown_tx.send(true);
        self.generation = self.generation.wrapping_add(1);
        abort_task(&mut self.hello_task);
        abort_task(&mut self.heartbeat_task);
        abort_task(&mut self.reader_task);

        if let Some(writer) = self.writer_ref.take() {
            let reason = if close_code == CLOSE_NORMAL {
                "closing"
            } else {
                "reconnecting"
            };
            if let Err(err) = writer
                .ask(WriterClose {
                    code: close_code,
                    reason,
                })
                .await
            {
                debug!(connection = %self.label, error = ?err, "close frame not sent");
            }
            let _ = writer.stop_gracefully().await;
            writer.wait_for_shutdown().await;
            if let Some(supervisor) = self.writer_supervisor_ref.as_ref() {
                writer.unlink(supervisor).await;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = shutdown_tx;
        self.shutdown_rx = shutdown_rx;
    }

    fn log_reconnect_plan(&self, note: &str, plan: &ReconnectPlan, delay: Option<Duration>) {
        let stats = self.health.get_stats();
        let delay_ms = delay.map(|d| d.as_millis().min(u64::MAX as u128) as u64);
        let uptime_ms = stats.uptime.as_millis().min(u64::MAX as u128) as u64;
        let last_message_age_ms = stats.last_message_age.as_millis().min(u64::MAX as u128) as u64;
        let rtt_us = stats.last_latency.map(|d| d.as_micros().min(u64::MAX as u128) as u64);

        warn!(
            connection = %self.label,
            url = %self.session.resume_url().unwrap_or(&self.initial_url),
            note = %note,
            cause = %plan.cause,
            resume = plan.resume,
            action = ?plan.action,
            attempt = self.reconnect_attempt,
            delay_ms,
            uptime_ms,
            last_message_age_ms,
            messages = stats.messages,
            sequence = ?self.session.sequence(),
            rtt_us,
            "gateway reconnect plan"
        );
    }
}

fn abort_task(handle: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = handle.take() {
        handle.abort();
    }
}

/// Validate `config` and start a session over the default websocket transport.
pub async fn spawn_gateway(config: GatewayConfig) -> GatewayResult<ActorRef<GatewayActor>> {
    let reconnect = config.backoff();
    spawn_gateway_with(config, TungsteniteTransport::default(), reconnect).await
}

/// Validate `config` and start a session over `transport`.
///
/// Configuration errors are returned here; everything after this point is
/// recovered by reconnecting.
pub async fn spawn_gateway_with<T, R>(
    config: GatewayConfig,
    transport: T,
    reconnect: R,
) -> GatewayResult<ActorRef<GatewayActor<T, R>>>
where
    T: WsTransport,
    R: WsReconnectStrategy,
{
    config.validate()?;
    let actor = GatewayActor::spawn(GatewayArgs {
        config,
        transport,
        reconnect,
    });
    actor
        .tell(GatewayEvent::Start)
        .send()
        .await
        .map_err(|_| GatewayError::ActorError("gateway actor stopped during start".to_string()))?;
    Ok(actor)
}
