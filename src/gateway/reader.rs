use bytes::{Bytes, BytesMut};

use super::envelope::{Envelope, decode_envelope};
use crate::core::{WsCloseFrame, WsFrame};

/// What one inbound frame produced.
#[derive(Debug, PartialEq)]
pub enum FrameOutcome {
    /// A fragment was buffered; no complete message yet.
    Pending,
    Envelope(Envelope),
    /// Websocket-level control frame (ping/pong); nothing for the session.
    Control,
    Closed(Option<WsCloseFrame>),
    /// The connection can no longer be trusted.
    Violation(String),
}

/// Reassembles fragments and decodes complete messages into envelopes.
///
/// Partial messages are never exposed. A message that fails to decode is a
/// violation, never silently skipped.
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    assembling: bool,
    max_message_bytes: usize,
}

impl FrameReader {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            assembling: false,
            max_message_bytes,
        }
    }

    pub fn is_assembling(&self) -> bool {
        self.assembling
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn on_frame(&mut self, frame: WsFrame) -> FrameOutcome {
        match frame {
            WsFrame::Text(payload) | WsFrame::Binary(payload) => {
                if self.assembling {
                    self.reset();
                    return FrameOutcome::Violation(
                        "new message started before previous fragments completed".to_string(),
                    );
                }
                self.decode(&payload)
            }
            WsFrame::Fragment { payload, fin } => self.on_fragment(payload, fin),
            WsFrame::Ping(_) | WsFrame::Pong(_) => FrameOutcome::Control,
            WsFrame::Close(frame) => {
                self.reset();
                FrameOutcome::Closed(frame)
            }
        }
    }

    /// Drop any partial message; called when the connection goes away.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.assembling = false;
    }

    fn on_fragment(&mut self, payload: Bytes, fin: bool) -> FrameOutcome {
        if self.buffer.len().saturating_add(payload.len()) > self.max_message_bytes {
            let size = self.buffer.len().saturating_add(payload.len());
            self.reset();
            return FrameOutcome::Violation(format!(
                "message exceeds {} bytes ({size} buffered)",
                self.max_message_bytes
            ));
        }

        if !self.assembling && fin {
            // Single-fragment message, no copy needed.
            return self.decode(&payload);
        }

        self.assembling = true;
        self.buffer.extend_from_slice(&payload);
        if !fin {
            return FrameOutcome::Pending;
        }

        let message = self.buffer.split().freeze();
        self.assembling = false;
        self.decode(&message)
    }

    fn decode(&self, message: &[u8]) -> FrameOutcome {
        if message.len() > self.max_message_bytes {
            return FrameOutcome::Violation(format!(
                "message exceeds {} bytes ({} received)",
                self.max_message_bytes,
                message.len()
            ));
        }
        match decode_envelope(message) {
            Ok(envelope) => FrameOutcome::Envelope(envelope),
            Err(err) => FrameOutcome::Violation(format!("malformed envelope: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::envelope::Opcode;

    const HELLO: &[u8] = br#"{"op":10,"d":{"heartbeat_interval":45000}}"#;

    fn reader() -> FrameReader {
        FrameReader::new(1024)
    }

    #[test]
    fn whole_text_frame_decodes() {
        match reader().on_frame(WsFrame::Text(Bytes::from_static(HELLO))) {
            FrameOutcome::Envelope(envelope) => assert_eq!(envelope.op, Opcode::HELLO),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn fragments_are_joined_in_arrival_order() {
        let mut reader = reader();
        let (a, rest) = HELLO.split_at(5);
        let (b, c) = rest.split_at(12);

        assert_eq!(
            reader.on_frame(WsFrame::fragment(Bytes::copy_from_slice(a), false)),
            FrameOutcome::Pending
        );
        assert_eq!(
            reader.on_frame(WsFrame::fragment(Bytes::copy_from_slice(b), false)),
            FrameOutcome::Pending
        );
        assert!(reader.is_assembling());

        match reader.on_frame(WsFrame::fragment(Bytes::copy_from_slice(c), true)) {
            FrameOutcome::Envelope(envelope) => {
                assert_eq!(envelope.payload_u64("heartbeat_interval"), Some(45_000));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!reader.is_assembling());
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn parse_failure_on_complete_message_is_a_violation() {
        let mut reader = reader();
        reader.on_frame(WsFrame::fragment(Bytes::from_static(b"{\"op\":"), false));
        assert!(matches!(
            reader.on_frame(WsFrame::fragment(Bytes::from_static(b"oops}"), true)),
            FrameOutcome::Violation(_)
        ));
    }

    #[test]
    fn interleaved_message_during_reassembly_is_a_violation() {
        let mut reader = reader();
        reader.on_frame(WsFrame::fragment(Bytes::from_static(b"{\"op\":"), false));
        assert!(matches!(
            reader.on_frame(WsFrame::Text(Bytes::from_static(HELLO))),
            FrameOutcome::Violation(_)
        ));
        assert_eq!(reader.buffered_len(), 0);
    }

    #[test]
    fn oversized_message_is_a_violation() {
        let mut reader = FrameReader::new(8);
        assert!(matches!(
            reader.on_frame(WsFrame::fragment(Bytes::from_static(b"123456"), false)),
            FrameOutcome::Pending
        ));
        assert!(matches!(
            reader.on_frame(WsFrame::fragment(Bytes::from_static(b"789"), true)),
            FrameOutcome::Violation(_)
        ));
    }

    #[test]
    fn close_and_control_frames_pass_through() {
        let mut reader = reader();
        reader.on_frame(WsFrame::fragment(Bytes::from_static(b"{"), false));
        assert_eq!(
            reader.on_frame(WsFrame::close(4000, Bytes::from_static(b"bye"))),
            FrameOutcome::Closed(Some(WsCloseFrame {
                code: 4000,
                reason: Bytes::from_static(b"bye"),
            }))
        );
        assert!(!reader.is_assembling());
        assert_eq!(
            reader.on_frame(WsFrame::Ping(Bytes::new())),
            FrameOutcome::Control
        );
    }
}
