use std::time::Duration;

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tokio::time::Instant;

use shared_gateway::core::{Credential, Intents, WsFrame};
use shared_gateway::gateway::{
    ConnectionProperties, FrameOutcome, FrameReader, GatewaySession, HandshakeParams,
    decode_envelope,
};

const MAX_MESSAGE_BYTES: usize = 1 << 20;

fn dispatch_payload(seq: u64) -> Bytes {
    // Roughly the size of a small MESSAGE_CREATE.
    let content = "x".repeat(384);
    Bytes::from(format!(
        r#"{{"op":0,"s":{seq},"t":"MESSAGE_CREATE","d":{{"id":"1203","channel_id":"42","content":"{content}"}}}}"#
    ))
}

fn bench_frame_reader(c: &mut Criterion) {
    let payload = dispatch_payload(1);

    c.bench_function("ingest_1000_whole_text_frames", |b| {
        let mut reader = FrameReader::new(MAX_MESSAGE_BYTES);
        b.iter(|| {
            for _ in 0..1000 {
                let outcome = reader.on_frame(WsFrame::Text(black_box(payload.clone())));
                black_box(matches!(outcome, FrameOutcome::Envelope(_)));
            }
        })
    });

    let pieces: Vec<Bytes> = payload
        .chunks(payload.len().div_ceil(4))
        .map(Bytes::copy_from_slice)
        .collect();
    c.bench_function("ingest_1000_messages_in_4_fragments", |b| {
        let mut reader = FrameReader::new(MAX_MESSAGE_BYTES);
        b.iter(|| {
            for _ in 0..1000 {
                for (index, piece) in pieces.iter().enumerate() {
                    let fin = index + 1 == pieces.len();
                    let outcome = reader.on_frame(WsFrame::fragment(piece.clone(), fin));
                    black_box(&outcome);
                }
            }
        })
    });
}

fn bench_session_dispatch(c: &mut Criterion) {
    let params = HandshakeParams {
        credential: Credential::new("bench-token").expect("valid credential"),
        intents: Intents::GUILDS,
        properties: ConnectionProperties::default(),
        large_threshold: 50,
        invalid_session_delay_min: Duration::from_secs(1),
        invalid_session_delay_max: Duration::from_secs(5),
    };
    let hello = decode_envelope(br#"{"op":10,"d":{"heartbeat_interval":45000}}"#)
        .expect("valid hello");
    let envelopes: Vec<_> = (1..=1000)
        .filter_map(|seq| decode_envelope(&dispatch_payload(seq)).ok())
        .collect();

    c.bench_function("session_handle_1000_dispatches", |b| {
        b.iter(|| {
            let mut session = GatewaySession::new(params.clone());
            session.mark_connecting();
            session.connection_opened();
            let now = Instant::now();
            let _ = session.handle(hello.clone(), now);
            for envelope in &envelopes {
                black_box(session.handle(envelope.clone(), now).map(|c| c.len()).ok());
            }
        })
    });
}

criterion_group!(benches, bench_frame_reader, bench_session_dispatch);
criterion_main!(benches);
