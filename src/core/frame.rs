use bytes::Bytes;

/// Transport-neutral websocket frame type.
///
/// Transports convert their native frame representation into/from `WsFrame`. Complete
/// data messages arrive as `Text`/`Binary`; transports that surface raw continuation
/// frames deliver them as `Fragment` and leave reassembly to the frame reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    /// One piece of a data message; `fin` marks the last piece.
    Fragment { payload: Bytes, fin: bool },
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsCloseFrame {
    pub fn reason_lossy(&self) -> String {
        String::from_utf8_lossy(self.reason.as_ref()).into_owned()
    }
}

impl WsFrame {
    #[inline]
    pub fn text_static(s: &'static str) -> Self {
        Self::Text(Bytes::from_static(s.as_bytes()))
    }

    #[inline]
    pub fn close(code: u16, reason: impl Into<Bytes>) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: reason.into(),
        }))
    }

    #[inline]
    pub fn fragment(payload: impl Into<Bytes>, fin: bool) -> Self {
        Self::Fragment {
            payload: payload.into(),
            fin,
        }
    }
}

/// Borrow the underlying bytes from frames without allocation.
#[inline]
pub fn frame_bytes(frame: &WsFrame) -> Option<&[u8]> {
    match frame {
        WsFrame::Text(bytes)
        | WsFrame::Binary(bytes)
        | WsFrame::Ping(bytes)
        | WsFrame::Pong(bytes) => Some(bytes.as_ref()),
        WsFrame::Fragment { payload, .. } => Some(payload.as_ref()),
        WsFrame::Close(_) => None,
    }
}

/// Convert owned bytes into a `WsFrame`, preferring text when bytes are valid UTF-8.
#[inline]
pub fn into_ws_frame<B>(bytes: B) -> WsFrame
where
    B: Into<Bytes>,
{
    let payload = bytes.into();
    if std::str::from_utf8(payload.as_ref()).is_ok() {
        WsFrame::Text(payload)
    } else {
        WsFrame::Binary(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_ws_frame_prefers_text_for_utf8() {
        assert!(matches!(into_ws_frame(b"{\"op\":1}".to_vec()), WsFrame::Text(_)));
        assert!(matches!(into_ws_frame(vec![0xff, 0xfe]), WsFrame::Binary(_)));
    }

    #[test]
    fn frame_bytes_covers_fragments_but_not_close() {
        let fragment = WsFrame::fragment(Bytes::from_static(b"abc"), false);
        assert_eq!(frame_bytes(&fragment), Some(&b"abc"[..]));
        assert_eq!(frame_bytes(&WsFrame::close(1000, Bytes::new())), None);
    }
}
