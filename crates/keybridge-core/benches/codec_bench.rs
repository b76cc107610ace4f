//! Criterion benchmarks for the keybridge wire codec.
//!
//! Every broadcast encodes one event, and every injected key decodes one
//! client message, so both paths sit on the key-press latency budget.
//!
//! Run with:
//! ```bash
//! cargo bench --package keybridge-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keybridge_core::protocol::codec::{
    decode_client_message, decode_event, encode_client_message, encode_event_into,
};
use keybridge_core::protocol::framing::encode_frame;
use keybridge_core::protocol::messages::{
    ClientMessage, Event, HidConsumerReport, HidKeyboardReport, KeyAddress, KeyEvent, KeyPosition,
    KscanEvent, MAX_EVENT_SIZE,
};
use keybridge_core::Endpoint;

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, Event)> {
    let mut events = vec![
        (
            "kscan",
            Event::Kscan(KscanEvent {
                source: 0,
                position: 23,
                pressed: true,
                timestamp: 1_234_567,
            }),
        ),
        (
            "keyboard",
            Event::Keyboard(HidKeyboardReport::truncating(
                Endpoint::USB,
                0x02,
                &[0x04, 0x05, 0, 0, 0, 0],
            )),
        ),
        (
            "consumer",
            Event::Consumer(HidConsumerReport::truncating(Endpoint::ble(1), &[0xE9, 0x00])),
        ),
    ];
    #[cfg(feature = "pointing")]
    events.push((
        "mouse",
        Event::Mouse(keybridge_core::protocol::messages::HidMouseReport {
            endpoint: Endpoint::USB,
            buttons: 1,
            dx: -4,
            dy: 9,
            scroll_x: 0,
            scroll_y: 0,
        }),
    ));
    events
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_event");
    for (name, event) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &event, |b, e| {
            let mut buf = [0u8; MAX_EVENT_SIZE];
            b.iter(|| encode_event_into(black_box(e), &mut buf).unwrap())
        });
    }
    group.finish();
}

fn bench_decode_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_event");
    for (name, event) in fixtures() {
        let bytes = keybridge_core::encode_event(&event).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_event(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_decode_client_message(c: &mut Criterion) {
    let by_rc = ClientMessage::from(KeyEvent::press(KeyAddress::KeyPos(KeyPosition {
        row: 2,
        col: 7,
    })));
    let by_pos = ClientMessage::from(KeyEvent::release(KeyAddress::Position(31)));
    let mut group = c.benchmark_group("decode_client_message");
    for (name, msg) in [("key_pos", by_rc), ("position", by_pos)] {
        let bytes = encode_client_message(&msg).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_client_message(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_encode_frame(c: &mut Criterion) {
    let payload = [0xA5u8; MAX_EVENT_SIZE];
    c.bench_function("encode_frame_max_event", |b| {
        b.iter(|| encode_frame(black_box(&payload), MAX_EVENT_SIZE).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_event,
    bench_decode_event,
    bench_decode_client_message,
    bench_encode_frame
);
criterion_main!(benches);
