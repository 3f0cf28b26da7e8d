//! Gateway session state machine.
//!
//! Pure: no IO, no timers. The session actor feeds it envelopes, heartbeat ticks
//! and connection events, and executes the [`SessionCommand`]s it returns.
//! Inbound envelopes are routed through a per-opcode handler table so each
//! transition can be driven directly in tests.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::envelope::{
    ConnectionProperties, Envelope, GatewayCommand, IdentifyPayload, Opcode, ResumePayload,
};
use super::heartbeat::{HeartbeatState, HeartbeatTick};
use crate::core::{
    Credential, GatewayError, GatewayResult, Intents, WsDisconnectAction, WsDisconnectCause,
    heartbeat_jitter, parse_url, random_between,
};

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Non-normal code the client uses when it intends to resume.
pub const CLOSE_RESUMABLE: u16 = 4000;
pub const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;
pub const CLOSE_INVALID_SEQUENCE: u16 = 4007;
pub const CLOSE_SESSION_TIMED_OUT: u16 = 4009;
pub const CLOSE_INVALID_SHARD: u16 = 4010;
pub const CLOSE_DISALLOWED_INTENTS: u16 = 4014;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingHello,
    Identifying,
    Resuming,
    Connected,
    Reconnecting,
}

/// How the next connection should be made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPlan {
    /// Resume the stored session (true) or identify from scratch.
    pub resume: bool,
    pub action: WsDisconnectAction,
    /// Lower bound on the wait before connecting again.
    pub min_delay: Duration,
    pub cause: WsDisconnectCause,
}

/// Work the session asks its owner to perform, in order.
#[derive(Debug)]
pub enum SessionCommand {
    Send(GatewayCommand),
    StartHeartbeat {
        interval: Duration,
        initial_delay: Duration,
    },
    HeartbeatAcked {
        rtt: Option<Duration>,
    },
    Publish(Envelope),
    Ready {
        resumed: bool,
    },
    /// Stored session state was discarded.
    Invalidated,
    Reconnect(ReconnectPlan),
    /// Unrecoverable; the session must not reconnect.
    Abort(GatewayError),
}

/// Handshake inputs taken from configuration.
#[derive(Clone, Debug)]
pub struct HandshakeParams {
    pub credential: Credential,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    pub large_threshold: u16,
    pub invalid_session_delay_min: Duration,
    pub invalid_session_delay_max: Duration,
}

/// Point-in-time view of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
    pub resume_url: Option<String>,
    pub heartbeat_interval: Option<Duration>,
    pub ack_pending: bool,
    pub latency: Option<Duration>,
}

type OpcodeHandler = fn(&mut GatewaySession, Envelope, Instant) -> GatewayResult<Vec<SessionCommand>>;

const HANDLERS: &[(Opcode, OpcodeHandler)] = &[
    (Opcode::HELLO, GatewaySession::on_hello),
    (Opcode::DISPATCH, GatewaySession::on_dispatch),
    (Opcode::HEARTBEAT_ACK, GatewaySession::on_heartbeat_ack),
    (Opcode::HEARTBEAT, GatewaySession::on_heartbeat_request),
    (Opcode::RECONNECT, GatewaySession::on_reconnect_request),
    (Opcode::INVALID_SESSION, GatewaySession::on_invalid_session),
];

/// One logical gateway session across any number of connections.
#[derive(Debug)]
pub struct GatewaySession {
    params: HandshakeParams,
    state: SessionState,
    session_id: Option<String>,
    sequence: Option<u64>,
    resume_url: Option<String>,
    heartbeat: HeartbeatState,
}

impl GatewaySession {
    pub fn new(params: HandshakeParams) -> Self {
        Self {
            params,
            state: SessionState::Disconnected,
            session_id: None,
            sequence: None,
            resume_url: None,
            heartbeat: HeartbeatState::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// A session can resume only with both an identifier and a sequence.
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.session_id.clone(),
            sequence: self.sequence,
            resume_url: self.resume_url.clone(),
            heartbeat_interval: self.heartbeat.interval(),
            ack_pending: self.heartbeat.ack_pending(),
            latency: self.heartbeat.last_rtt(),
        }
    }

    /// Enter `Connecting`; returns the address to dial.
    pub fn begin_connect<'a>(&'a self, initial_url: &'a str) -> &'a str {
        match (self.can_resume(), self.resume_url.as_deref()) {
            (true, Some(resume_url)) => resume_url,
            _ => initial_url,
        }
    }

    pub fn mark_connecting(&mut self) {
        self.state = SessionState::Connecting;
        self.heartbeat.reset();
    }

    /// The socket is open; the first envelope must be hello.
    pub fn connection_opened(&mut self) {
        self.state = SessionState::AwaitingHello;
    }

    /// Route one inbound envelope.
    pub fn handle(&mut self, envelope: Envelope, now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        match self.state {
            SessionState::AwaitingHello if envelope.op != Opcode::HELLO => {
                return Err(GatewayError::ProtocolViolation(format!(
                    "expected hello, received {:?}",
                    envelope.op
                )));
            }
            SessionState::AwaitingHello
            | SessionState::Identifying
            | SessionState::Resuming
            | SessionState::Connected => {}
            SessionState::Disconnected | SessionState::Connecting | SessionState::Reconnecting => {
                debug!(op = ?envelope.op, state = ?self.state, "dropping envelope outside a live connection");
                return Ok(Vec::new());
            }
        }

        match HANDLERS.iter().find(|(op, _)| *op == envelope.op) {
            Some((_, handler)) => handler(self, envelope, now),
            None => {
                debug!(op = ?envelope.op, "ignoring unhandled opcode");
                Ok(Vec::new())
            }
        }
    }

    fn on_hello(&mut self, envelope: Envelope, _now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        if self.state != SessionState::AwaitingHello {
            warn!(state = ?self.state, "ignoring hello on an established connection");
            return Ok(Vec::new());
        }

        let interval = envelope
            .payload_u64("heartbeat_interval")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                GatewayError::ProtocolViolation("hello without heartbeat interval".to_string())
            })?;
        self.heartbeat.start(interval);

        let handshake = match (&self.session_id, self.sequence) {
            (Some(session_id), Some(seq)) => {
                self.state = SessionState::Resuming;
                GatewayCommand::Resume(ResumePayload {
                    token: self.params.credential.token().to_string(),
                    session_id: session_id.clone(),
                    seq,
                })
            }
            _ => {
                self.state = SessionState::Identifying;
                GatewayCommand::Identify(IdentifyPayload {
                    token: self.params.credential.token().to_string(),
                    intents: self.params.intents,
                    properties: self.params.properties.clone(),
                    large_threshold: self.params.large_threshold,
                    presence: None,
                })
            }
        };

        Ok(vec![
            SessionCommand::Send(handshake),
            SessionCommand::StartHeartbeat {
                interval,
                initial_delay: heartbeat_jitter(interval),
            },
        ])
    }

    fn on_dispatch(&mut self, envelope: Envelope, _now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        if let Some(seq) = envelope.s
            && self.sequence.is_none_or(|current| seq > current)
        {
            self.sequence = Some(seq);
        }

        let mut commands = Vec::with_capacity(2);
        match envelope.event_name() {
            Some("READY") => {
                let session_id = envelope.payload_str("session_id").ok_or_else(|| {
                    GatewayError::ProtocolViolation("READY without session_id".to_string())
                })?;
                self.session_id = Some(session_id.to_string());
                self.resume_url = envelope
                    .payload_str("resume_gateway_url")
                    .and_then(|raw| match parse_url(raw, &["ws", "wss"]) {
                        Ok(_) => Some(raw.to_string()),
                        Err(err) => {
                            warn!(error = %err, "ignoring unusable resume address");
                            None
                        }
                    });
                self.state = SessionState::Connected;
                commands.push(SessionCommand::Ready { resumed: false });
            }
            Some("RESUMED") => {
                self.state = SessionState::Connected;
                commands.push(SessionCommand::Ready { resumed: true });
            }
            _ => {}
        }

        commands.push(SessionCommand::Publish(envelope));
        Ok(commands)
    }

    fn on_heartbeat_ack(&mut self, _envelope: Envelope, now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        let rtt = self.heartbeat.on_ack(now);
        Ok(vec![SessionCommand::HeartbeatAcked { rtt }])
    }

    fn on_heartbeat_request(&mut self, _envelope: Envelope, now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        self.heartbeat.on_requested(now);
        Ok(vec![SessionCommand::Send(GatewayCommand::Heartbeat(
            self.sequence,
        ))])
    }

    fn on_reconnect_request(&mut self, _envelope: Envelope, _now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        Ok(vec![SessionCommand::Reconnect(self.plan(
            WsDisconnectAction::ImmediateReconnect,
            Duration::ZERO,
            WsDisconnectCause::ReconnectRequested,
        ))])
    }

    fn on_invalid_session(&mut self, envelope: Envelope, _now: Instant) -> GatewayResult<Vec<SessionCommand>> {
        debug!(resumable = ?envelope.payload_bool(), "session invalidated by server");
        self.invalidate();
        let delay = random_between(
            self.params.invalid_session_delay_min,
            self.params.invalid_session_delay_max,
        );
        Ok(vec![
            SessionCommand::Invalidated,
            SessionCommand::Reconnect(self.plan(
                WsDisconnectAction::ImmediateReconnect,
                delay,
                WsDisconnectCause::SessionInvalidated,
            )),
        ])
    }

    /// Heartbeat timer fired.
    pub fn heartbeat_tick(&mut self, now: Instant) -> Vec<SessionCommand> {
        if !matches!(
            self.state,
            SessionState::Identifying | SessionState::Resuming | SessionState::Connected
        ) {
            return Vec::new();
        }

        match self.heartbeat.tick(now) {
            HeartbeatTick::Send => vec![SessionCommand::Send(GatewayCommand::Heartbeat(
                self.sequence,
            ))],
            HeartbeatTick::Missed => vec![SessionCommand::Reconnect(self.plan(
                WsDisconnectAction::ImmediateReconnect,
                Duration::ZERO,
                WsDisconnectCause::HeartbeatTimeout,
            ))],
        }
    }

    /// Hello deadline passed; only meaningful while still waiting for it.
    pub fn hello_timed_out(&mut self) -> Option<SessionCommand> {
        (self.state == SessionState::AwaitingHello)
            .then(|| self.connection_lost(WsDisconnectCause::HelloTimeout))
    }

    /// The caller asked to drop the connection and resume.
    pub fn request_reconnect(&mut self) -> SessionCommand {
        SessionCommand::Reconnect(self.plan(
            WsDisconnectAction::ImmediateReconnect,
            Duration::ZERO,
            WsDisconnectCause::ClientRequested,
        ))
    }

    /// Classify a lost connection.
    pub fn connection_lost(&mut self, cause: WsDisconnectCause) -> SessionCommand {
        let code = match &cause {
            WsDisconnectCause::RemoteClosed { code, .. } => *code,
            _ => None,
        };

        match code {
            Some(CLOSE_AUTHENTICATION_FAILED) => {
                self.stop();
                SessionCommand::Abort(GatewayError::AuthenticationFailed {
                    code: CLOSE_AUTHENTICATION_FAILED,
                })
            }
            Some(code @ CLOSE_INVALID_SHARD..=CLOSE_DISALLOWED_INTENTS) => {
                self.stop();
                SessionCommand::Abort(GatewayError::Rejected { code })
            }
            // The server no longer knows this session. A remote 1000 or 1001
            // falls through to resume: that is how a gateway node restart closes.
            Some(CLOSE_INVALID_SEQUENCE | CLOSE_SESSION_TIMED_OUT) => {
                self.invalidate();
                SessionCommand::Reconnect(self.plan(
                    WsDisconnectAction::BackoffReconnect,
                    Duration::ZERO,
                    cause,
                ))
            }
            _ => {
                let action = match cause {
                    WsDisconnectCause::ReconnectRequested | WsDisconnectCause::ClientRequested => {
                        WsDisconnectAction::ImmediateReconnect
                    }
                    _ => WsDisconnectAction::BackoffReconnect,
                };
                SessionCommand::Reconnect(self.plan(action, Duration::ZERO, cause))
            }
        }
    }

    /// Explicit stop: forget everything.
    pub fn stop(&mut self) {
        self.invalidate();
        self.heartbeat.reset();
        self.state = SessionState::Disconnected;
    }

    fn invalidate(&mut self) {
        self.session_id = None;
        self.sequence = None;
        self.resume_url = None;
    }

    fn plan(
        &mut self,
        action: WsDisconnectAction,
        min_delay: Duration,
        cause: WsDisconnectCause,
    ) -> ReconnectPlan {
        self.state = SessionState::Reconnecting;
        self.heartbeat.reset();
        ReconnectPlan {
            resume: self.can_resume(),
            action,
            min_delay,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::envelope::decode_envelope;

    fn session() -> GatewaySession {
        GatewaySession::new(HandshakeParams {
            credential: Credential::new("token").expect("valid"),
            intents: Intents::GUILDS,
            properties: ConnectionProperties::default(),
            large_threshold: 50,
            invalid_session_delay_min: Duration::from_secs(1),
            invalid_session_delay_max: Duration::from_secs(5),
        })
    }

    fn envelope(json: &str) -> Envelope {
        decode_envelope(json.as_bytes()).expect("valid envelope")
    }

    fn hello(ms: u64) -> Envelope {
        envelope(&format!(r#"{{"op":10,"d":{{"heartbeat_interval":{ms}}}}}"#))
    }

    fn ready(seq: u64) -> Envelope {
        envelope(&format!(
            r#"{{"op":0,"s":{seq},"t":"READY","d":{{"session_id":"sess-1","resume_gateway_url":"wss://resume.example.test"}}}}"#
        ))
    }

    fn dispatch(seq: u64) -> Envelope {
        envelope(&format!(r#"{{"op":0,"s":{seq},"t":"MESSAGE_CREATE","d":{{}}}}"#))
    }

    fn open(session: &mut GatewaySession) {
        session.mark_connecting();
        session.connection_opened();
    }

    fn connected_session(now: Instant) -> GatewaySession {
        let mut session = session();
        open(&mut session);
        session.handle(hello(45_000), now).expect("hello");
        session.handle(ready(12), now).expect("ready");
        session
    }

    fn reconnect_plan(command: SessionCommand) -> ReconnectPlan {
        match command {
            SessionCommand::Reconnect(plan) => plan,
            other => panic!("expected reconnect, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hello_then_ready_connects_with_sequence() {
        let now = Instant::now();
        let mut session = session();
        open(&mut session);
        assert_eq!(session.state(), SessionState::AwaitingHello);

        let commands = session.handle(hello(45_000), now).expect("hello");
        assert_eq!(session.state(), SessionState::Identifying);
        assert!(matches!(
            commands.as_slice(),
            [
                SessionCommand::Send(GatewayCommand::Identify(_)),
                SessionCommand::StartHeartbeat { interval, initial_delay },
            ] if *interval == Duration::from_secs(45) && *initial_delay < *interval
        ));

        let commands = session.handle(ready(12), now).expect("ready");
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.sequence(), Some(12));
        assert_eq!(session.session_id(), Some("sess-1"));
        assert_eq!(session.resume_url(), Some("wss://resume.example.test"));
        assert!(matches!(
            commands.as_slice(),
            [SessionCommand::Ready { resumed: false }, SessionCommand::Publish(_)]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn first_envelope_other_than_hello_is_a_violation() {
        let mut session = session();
        open(&mut session);
        assert!(matches!(
            session.handle(dispatch(1), Instant::now()),
            Err(GatewayError::ProtocolViolation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_without_session_id_is_a_violation() {
        let now = Instant::now();
        let mut session = session();
        open(&mut session);
        session.handle(hello(1_000), now).expect("hello");
        assert!(matches!(
            session.handle(envelope(r#"{"op":0,"s":1,"t":"READY","d":{}}"#), now),
            Err(GatewayError::ProtocolViolation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sequence_never_moves_backwards() {
        let now = Instant::now();
        let mut session = connected_session(now);

        for (seq, expected) in [(13, 13), (13, 13), (11, 13), (20, 20), (19, 20)] {
            let commands = session.handle(dispatch(seq), now).expect("dispatch");
            assert_eq!(session.sequence(), Some(expected));
            // Out-of-order envelopes are still published.
            assert!(matches!(commands.as_slice(), [SessionCommand::Publish(_)]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn missed_ack_plans_resume_with_session_kept() {
        let now = Instant::now();
        let mut session = connected_session(now);

        assert!(matches!(
            session.heartbeat_tick(now).as_slice(),
            [SessionCommand::Send(GatewayCommand::Heartbeat(Some(12)))]
        ));
        let mut commands = session.heartbeat_tick(now + Duration::from_secs(45));
        let plan = reconnect_plan(commands.remove(0));

        assert!(plan.resume);
        assert_eq!(plan.cause, WsDisconnectCause::HeartbeatTimeout);
        assert_eq!(plan.action, WsDisconnectAction::ImmediateReconnect);
        assert_eq!(session.state(), SessionState::Reconnecting);
        assert_eq!(session.session_id(), Some("sess-1"));
        assert_eq!(
            session.begin_connect("wss://initial.example.test"),
            "wss://resume.example.test"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ack_between_ticks_keeps_connection() {
        let now = Instant::now();
        let mut session = connected_session(now);
        session.heartbeat_tick(now);

        let commands = session
            .handle(envelope(r#"{"op":11}"#), now + Duration::from_millis(30))
            .expect("ack");
        assert!(matches!(
            commands.as_slice(),
            [SessionCommand::HeartbeatAcked { rtt: Some(rtt) }] if *rtt == Duration::from_millis(30)
        ));
        assert!(matches!(
            session.heartbeat_tick(now + Duration::from_secs(45)).as_slice(),
            [SessionCommand::Send(GatewayCommand::Heartbeat(Some(12)))]
        ));
        assert_eq!(session.snapshot().latency, Some(Duration::from_millis(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn resume_handshake_after_reconnect() {
        let now = Instant::now();
        let mut session = connected_session(now);
        reconnect_plan(session.request_reconnect());

        open(&mut session);
        let commands = session.handle(hello(45_000), now).expect("hello");
        assert_eq!(session.state(), SessionState::Resuming);
        match &commands[0] {
            SessionCommand::Send(GatewayCommand::Resume(payload)) => {
                assert_eq!(payload.session_id, "sess-1");
                assert_eq!(payload.seq, 12);
            }
            other => panic!("expected resume, got {other:?}"),
        }

        session.handle(dispatch(13), now).expect("replayed");
        let commands = session
            .handle(envelope(r#"{"op":0,"s":14,"t":"RESUMED","d":{}}"#), now)
            .expect("resumed");
        assert!(matches!(commands[0], SessionCommand::Ready { resumed: true }));
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.sequence(), Some(14));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_session_clears_state_and_identifies() {
        let now = Instant::now();
        let mut session = connected_session(now);

        let mut commands = session
            .handle(envelope(r#"{"op":9,"d":true}"#), now)
            .expect("invalid session");
        assert!(matches!(commands[0], SessionCommand::Invalidated));
        let plan = reconnect_plan(commands.remove(1));
        assert!(!plan.resume);
        assert!(plan.min_delay >= Duration::from_secs(1));
        assert!(plan.min_delay <= Duration::from_secs(5));
        assert_eq!(session.session_id(), None);
        assert_eq!(session.sequence(), None);
        assert_eq!(
            session.begin_connect("wss://initial.example.test"),
            "wss://initial.example.test"
        );

        open(&mut session);
        let commands = session.handle(hello(45_000), now).expect("hello");
        assert!(matches!(
            commands[0],
            SessionCommand::Send(GatewayCommand::Identify(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn server_heartbeat_request_is_answered_immediately() {
        let now = Instant::now();
        let mut session = connected_session(now);
        let commands = session.handle(envelope(r#"{"op":1,"d":null}"#), now).expect("request");
        assert!(matches!(
            commands.as_slice(),
            [SessionCommand::Send(GatewayCommand::Heartbeat(Some(12)))]
        ));
        assert!(!session.snapshot().ack_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn close_codes_are_classified() {
        let now = Instant::now();
        let closed = |code: u16| WsDisconnectCause::RemoteClosed {
            code: Some(code),
            reason: String::new(),
        };

        let mut session = connected_session(now);
        assert!(matches!(
            session.connection_lost(closed(4004)),
            SessionCommand::Abort(GatewayError::AuthenticationFailed { code: 4004 })
        ));
        assert_eq!(session.state(), SessionState::Disconnected);

        let mut session = connected_session(now);
        assert!(matches!(
            session.connection_lost(closed(4014)),
            SessionCommand::Abort(GatewayError::Rejected { code: 4014 })
        ));

        let mut session = connected_session(now);
        let plan = reconnect_plan(session.connection_lost(closed(4009)));
        assert!(!plan.resume);
        assert_eq!(session.session_id(), None);

        let mut session = connected_session(now);
        let plan = reconnect_plan(session.connection_lost(closed(4008)));
        assert!(plan.resume);
        assert_eq!(plan.action, WsDisconnectAction::BackoffReconnect);

        let mut session = connected_session(now);
        let plan = reconnect_plan(session.connection_lost(closed(4007)));
        assert!(!plan.resume);
        assert_eq!(session.sequence(), None);

        for code in [CLOSE_NORMAL, CLOSE_GOING_AWAY] {
            let mut session = connected_session(now);
            let plan = reconnect_plan(session.connection_lost(closed(code)));
            assert!(plan.resume, "close {code} must keep the session");
            assert_eq!(plan.action, WsDisconnectAction::BackoffReconnect);
            assert!(session.session_id().is_some());
            assert!(session.sequence().is_some());
        }

        let mut session = connected_session(now);
        let plan = reconnect_plan(session.connection_lost(WsDisconnectCause::StreamEnded));
        assert!(plan.resume);
    }

    #[tokio::test(start_paused = true)]
    async fn hello_timeout_only_applies_while_waiting() {
        let now = Instant::now();
        let mut session = session();
        open(&mut session);
        let plan = reconnect_plan(session.hello_timed_out().expect("still waiting"));
        assert_eq!(plan.cause, WsDisconnectCause::HelloTimeout);

        let mut session = connected_session(now);
        assert!(session.hello_timed_out().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_everything() {
        let mut session = connected_session(Instant::now());
        session.stop();
        assert_eq!(
            session.snapshot(),
            SessionSnapshot {
                state: SessionState::Disconnected,
                session_id: None,
                sequence: None,
                resume_url: None,
                heartbeat_interval: None,
                ack_pending: false,
                latency: None,
            }
        );
    }
}
