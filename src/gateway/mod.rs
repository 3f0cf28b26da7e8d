//! Streaming half: envelope codec, frame reader, session state machine and
//! the actor that keeps one session alive across connections.

pub mod actor;
pub mod config;
pub mod envelope;
pub mod events;
pub mod heartbeat;
pub mod reader;
pub mod session;
pub mod writer;

pub use actor::{
    GatewayActor, GatewayArgs, GatewayEvent, GetConnectionStats, GetFatalError,
    GetSessionSnapshot, SendCommand, Subscribe, spawn_gateway, spawn_gateway_with,
};
pub use config::{DEFAULT_API_VERSION, DEFAULT_GATEWAY_URL, GatewayConfig};
pub use envelope::{
    ConnectionProperties, Envelope, GatewayCommand, IdentifyPayload, Opcode, ResumePayload,
    decode_envelope,
};
pub use events::{EventStream, EventSurface};
pub use heartbeat::{HeartbeatState, HeartbeatTick};
pub use reader::{FrameOutcome, FrameReader};
pub use session::{
    GatewaySession, HandshakeParams, ReconnectPlan, SessionCommand, SessionSnapshot,
    SessionState,
};
pub use writer::{GatewayWriter, WriterClose, WriterWrite};
