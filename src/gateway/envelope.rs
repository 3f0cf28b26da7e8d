//! Gateway envelope codec.

use std::fmt;

use serde::{Deserialize, Serialize};
use sonic_rs::{JsonValueTrait, Value};

use crate::core::Intents;

/// Gateway operation code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opcode(pub u8);

impl Opcode {
    pub const DISPATCH: Self = Self(0);
    pub const HEARTBEAT: Self = Self(1);
    pub const IDENTIFY: Self = Self(2);
    pub const PRESENCE_UPDATE: Self = Self(3);
    pub const VOICE_STATE_UPDATE: Self = Self(4);
    pub const RESUME: Self = Self(6);
    pub const RECONNECT: Self = Self(7);
    pub const REQUEST_GUILD_MEMBERS: Self = Self(8);
    pub const INVALID_SESSION: Self = Self(9);
    pub const HELLO: Self = Self(10);
    pub const HEARTBEAT_ACK: Self = Self(11);

    pub fn name(self) -> &'static str {
        match self {
            Self::DISPATCH => "dispatch",
            Self::HEARTBEAT => "heartbeat",
            Self::IDENTIFY => "identify",
            Self::PRESENCE_UPDATE => "presence_update",
            Self::VOICE_STATE_UPDATE => "voice_state_update",
            Self::RESUME => "resume",
            Self::RECONNECT => "reconnect",
            Self::REQUEST_GUILD_MEMBERS => "request_guild_members",
            Self::INVALID_SESSION => "invalid_session",
            Self::HELLO => "hello",
            Self::HEARTBEAT_ACK => "heartbeat_ack",
            _ => "unknown",
        }
    }

    /// Opcodes the client owns; callers may not send these directly.
    pub fn is_session_control(self) -> bool {
        matches!(
            self,
            Self::HEARTBEAT | Self::IDENTIFY | Self::RESUME
        )
    }

    /// Opcodes only the server sends.
    pub fn is_server_only(self) -> bool {
        matches!(
            self,
            Self::DISPATCH
                | Self::RECONNECT
                | Self::INVALID_SESSION
                | Self::HELLO
                | Self::HEARTBEAT_ACK
        )
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// One decoded unit from the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub op: Opcode,
    #[serde(default)]
    pub d: Option<Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl Envelope {
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    pub fn sequence(&self) -> Option<u64> {
        self.s
    }

    pub fn is_dispatch(&self) -> bool {
        self.op == Opcode::DISPATCH
    }

    /// Look up a string field of the payload object.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.d.as_ref()?.get(field).and_then(|v| v.as_str())
    }

    pub fn payload_u64(&self, field: &str) -> Option<u64> {
        self.d.as_ref()?.get(field).and_then(|v| v.as_u64())
    }

    pub fn payload_bool(&self) -> Option<bool> {
        self.d.as_ref().and_then(|v| v.as_bool())
    }
}

pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, sonic_rs::Error> {
    sonic_rs::from_slice(bytes)
}

/// Client-reported connection properties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    pub large_threshold: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Frames the client sends.
#[derive(Clone, Debug, PartialEq)]
pub enum GatewayCommand {
    Identify(IdentifyPayload),
    Resume(ResumePayload),
    /// Heartbeat carrying the last seen sequence (null before the first dispatch).
    Heartbeat(Option<u64>),
    Custom { op: Opcode, d: Value },
}

#[derive(Serialize)]
struct Outbound<'a, T: Serialize> {
    op: Opcode,
    d: &'a T,
}

impl GatewayCommand {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Identify(_) => Opcode::IDENTIFY,
            Self::Resume(_) => Opcode::RESUME,
            Self::Heartbeat(_) => Opcode::HEARTBEAT,
            Self::Custom { op, .. } => *op,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, sonic_rs::Error> {
        let op = self.opcode();
        match self {
            Self::Identify(d) => sonic_rs::to_vec(&Outbound { op, d }),
            Self::Resume(d) => sonic_rs::to_vec(&Outbound { op, d }),
            Self::Heartbeat(d) => sonic_rs::to_vec(&Outbound { op, d }),
            Self::Custom { d, .. } => sonic_rs::to_vec(&Outbound { op, d }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Decoded<T> {
        op: u8,
        d: T,
    }

    #[test]
    fn decodes_dispatch_envelope() {
        let envelope = decode_envelope(
            br#"{"op":0,"s":12,"t":"READY","d":{"session_id":"abc","resume_gateway_url":"wss://resume.example.test"}}"#,
        )
        .expect("valid envelope");

        assert!(envelope.is_dispatch());
        assert_eq!(envelope.sequence(), Some(12));
        assert_eq!(envelope.event_name(), Some("READY"));
        assert_eq!(envelope.payload_str("session_id"), Some("abc"));
        assert_eq!(envelope.payload_u64("missing"), None);
    }

    #[test]
    fn decodes_control_envelope_with_null_fields() {
        let envelope =
            decode_envelope(br#"{"op":10,"d":{"heartbeat_interval":45000},"s":null,"t":null}"#)
                .expect("valid envelope");
        assert_eq!(envelope.op, Opcode::HELLO);
        assert_eq!(envelope.payload_u64("heartbeat_interval"), Some(45_000));
        assert_eq!(envelope.sequence(), None);

        let invalid = decode_envelope(br#"{"op":9,"d":false}"#).expect("valid envelope");
        assert_eq!(invalid.payload_bool(), Some(false));
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(decode_envelope(b"{\"op\":").is_err());
        assert!(decode_envelope(br#"{"d":null}"#).is_err());
    }

    #[test]
    fn encodes_handshake_commands() {
        let resume = GatewayCommand::Resume(ResumePayload {
            token: "t".into(),
            session_id: "abc".into(),
            seq: 12,
        });
        let decoded: Decoded<ResumePayload> =
            sonic_rs::from_slice(&resume.encode().expect("encode")).expect("decode");
        assert_eq!(decoded.op, 6);
        assert_eq!(decoded.d.session_id, "abc");
        assert_eq!(decoded.d.seq, 12);

        let heartbeat = GatewayCommand::Heartbeat(None).encode().expect("encode");
        assert_eq!(heartbeat, br#"{"op":1,"d":null}"#.to_vec());
    }
}
