//! Integration tests for the observer socket.
//!
//! Each test runs a real [`EventHub`] on a uniquely named socket under the
//! system temp directory and connects to it with plain `UnixStream`s, the way
//! an observer process would.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use keybridge_core::protocol::framing::{encode_frame, recv_frame};
use keybridge_core::protocol::messages::{HidConsumerReport, KscanEvent};
use keybridge_core::{decode_event, encode_event, Endpoint, Event, MAX_EVENT_SIZE};
use keybridge_server::infrastructure::network::EventHub;
use keybridge_server::infrastructure::storage::config::ObserverConfig;

fn temp_socket() -> PathBuf {
    std::env::temp_dir().join(format!("keybridge-hub-{}.sock", uuid::Uuid::new_v4()))
}

fn start_hub(max_clients: usize) -> EventHub {
    EventHub::start(&ObserverConfig {
        socket_path: temp_socket(),
        max_clients,
    })
    .expect("hub must start")
}

/// Polls `cond` until it holds or two seconds pass.
fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn connect(hub: &EventHub) -> UnixStream {
    let stream = UnixStream::connect(hub.socket_path()).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

fn read_event(stream: &mut UnixStream) -> Event {
    let payload = recv_frame(stream, MAX_EVENT_SIZE).expect("frame");
    decode_event(&payload).expect("event")
}

/// Reads one frame and returns it byte for byte, prefix included.
fn read_raw_frame(stream: &mut UnixStream) -> Vec<u8> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).expect("prefix");
    let mut frame = prefix.to_vec();
    frame.resize(4 + u32::from_be_bytes(prefix) as usize, 0);
    stream.read_exact(&mut frame[4..]).expect("body");
    frame
}

fn press(position: u32) -> Event {
    Event::Kscan(KscanEvent {
        source: 0,
        position,
        pressed: true,
        timestamp: 10,
    })
}

#[test]
fn test_every_subscriber_receives_each_event() {
    // Arrange
    let hub = start_hub(4);
    let mut a = connect(&hub);
    let mut b = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 2));

    // Act
    hub.broadcast(&press(1));
    hub.broadcast(&Event::Consumer(HidConsumerReport::truncating(
        Endpoint::USB,
        &[0xE9, 0x00],
    )));

    // Assert
    for stream in [&mut a, &mut b] {
        assert_eq!(read_event(stream), press(1));
        assert!(matches!(read_event(stream), Event::Consumer(_)));
    }
}

#[test]
fn test_broadcast_with_no_subscribers_is_a_no_op() {
    let hub = start_hub(2);
    hub.broadcast(&press(0));
    assert_eq!(hub.subscriber_count(), 0);
}

#[test]
fn test_closed_subscriber_is_evicted_without_affecting_others() {
    // Arrange
    let hub = start_hub(4);
    let gone = connect(&hub);
    let mut alive = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 2));
    drop(gone);

    // Act: the first send to the closed peer may still succeed, the next
    // one fails and evicts it.
    hub.broadcast(&press(7));
    hub.broadcast(&press(8));

    // Assert
    assert!(wait_until(|| {
        hub.broadcast(&press(9));
        hub.subscriber_count() == 1
    }));
    assert_eq!(read_event(&mut alive), press(7));
    assert_eq!(read_event(&mut alive), press(8));
}

#[test]
fn test_failing_middle_subscriber_leaves_neighbours_byte_identical() {
    // Arrange: three slots, filled in order, then the middle observer goes away.
    let hub = start_hub(3);
    let mut first = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));
    let middle = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 2));
    let mut last = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 3));
    drop(middle);
    let event = Event::Consumer(HidConsumerReport::truncating(Endpoint::ble(2), &[0xB5]));
    let expected = encode_frame(&encode_event(&event).unwrap(), MAX_EVENT_SIZE).unwrap();

    // Act
    let mut sent = 0;
    assert!(wait_until(|| {
        hub.broadcast(&event);
        sent += 1;
        hub.subscriber_count() == 2
    }));

    // Assert
    for _ in 0..sent {
        let from_first = read_raw_frame(&mut first);
        let from_last = read_raw_frame(&mut last);
        assert_eq!(from_first, expected);
        assert_eq!(from_last, from_first);
    }

    // The freed slot takes a new observer straight away.
    let mut replacement = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 3));
    hub.broadcast(&press(4));
    assert_eq!(read_event(&mut replacement), press(4));
    assert_eq!(read_event(&mut first), press(4));
    assert_eq!(read_event(&mut last), press(4));
}

#[test]
fn test_connection_beyond_capacity_is_closed() {
    // Arrange
    let hub = start_hub(2);
    let _a = connect(&hub);
    let _b = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 2));

    // Act
    let mut extra = connect(&hub);

    // Assert: the server closes the extra connection, so a read sees EOF.
    let mut buf = [0u8; 1];
    assert_eq!(extra.read(&mut buf).unwrap(), 0);
    assert_eq!(hub.subscriber_count(), 2);
}

#[test]
fn test_freed_slot_is_reused() {
    let hub = start_hub(1);
    let first = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));
    drop(first);
    assert!(wait_until(|| {
        hub.broadcast(&press(0));
        hub.subscriber_count() == 0
    }));

    let mut second = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));
    hub.broadcast(&press(3));
    assert_eq!(read_event(&mut second), press(3));
}

#[test]
fn test_stop_closes_subscribers_and_removes_socket() {
    // Arrange
    let hub = start_hub(2);
    let path = hub.socket_path().to_path_buf();
    let mut observer = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));

    // Act
    hub.stop();

    // Assert
    assert!(!hub.is_running());
    assert!(!path.exists());
    let mut buf = [0u8; 1];
    assert_eq!(observer.read(&mut buf).unwrap(), 0);
    hub.stop();
}

#[test]
fn test_stop_returns_when_socket_file_was_removed() {
    // Arrange: the socket file disappears while the hub is running.
    let hub = start_hub(2);
    let _observer = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));
    std::fs::remove_file(hub.socket_path()).unwrap();

    // Act
    let (done_tx, done_rx) = mpsc::channel();
    std::thread::spawn(move || {
        hub.stop();
        let _ = done_tx.send(hub.is_running());
    });

    // Assert
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(3)), Ok(false));
}

#[test]
fn test_concurrent_producers_all_deliver() {
    // Arrange
    let hub = std::sync::Arc::new(start_hub(1));
    let mut observer = connect(&hub);
    assert!(wait_until(|| hub.subscriber_count() == 1));

    // Act
    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let hub = std::sync::Arc::clone(&hub);
            std::thread::spawn(move || {
                for i in 0..10 {
                    hub.broadcast(&press(p * 100 + i));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    // Assert: frames never interleave, so all 40 decode cleanly.
    let mut seen = Vec::new();
    for _ in 0..40 {
        match read_event(&mut observer) {
            Event::Kscan(e) => seen.push(e.position),
            other => panic!("unexpected event {other:?}"),
        }
    }
    seen.sort_unstable();
    let mut expected: Vec<u32> = (0..4).flat_map(|p| (0..10).map(move |i| p * 100 + i)).collect();
    expected.sort_unstable();
    assert_eq!(seen, expected);
}
