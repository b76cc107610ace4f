//! Event broadcast hub for the observer socket.
//!
//! Observers connect to the socket and from then on receive every event as a
//! length-prefixed frame.  They never send anything.
//!
//! # Subscriber table
//!
//! Subscribers live in a fixed table of `max_clients` slots guarded by one
//! mutex.  The accept thread takes the first free slot; a connection that finds
//! the table full is closed straight away.
//!
//! # Broadcast
//!
//! [`EventHub::broadcast`] is called from producer threads (the firmware's
//! event listeners).  It encodes the event once into a stack buffer, before
//! taking the lock, then
//! writes the frame to each subscriber with a single non-blocking send.  Any
//! failure, including a full socket buffer, closes that subscriber and frees
//! its slot; the others still get the frame.  A producer is therefore never
//! blocked by a slow observer, and never sees an error.
//!
//! ```text
//! producer ──encode──► frame ──lock──► slot 0 ✓
//!                                      slot 1 ✗ (EAGAIN) → closed, freed
//!                                      slot 2 ✓
//! ```

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use keybridge_core::protocol::codec::encode_event_into;
use keybridge_core::protocol::framing::{seal_frame, send_encoded_frame, LENGTH_PREFIX_SIZE};
use keybridge_core::{Event, MAX_EVENT_SIZE};
use tracing::{debug, error, info, trace, warn};

use super::{
    accept_until_stopped, bind_listener, join_worker, remove_socket_file, ListenError, ListenerWaker,
};
use crate::application::notify_events::EventSink;
use crate::infrastructure::storage::config::ObserverConfig;

const THREAD_NAME: &str = "keybridge-observer";

// ── Subscriber table ──────────────────────────────────────────────────────────

/// Fixed-capacity set of connected observers.
pub struct SubscriberTable {
    slots: Mutex<Box<[Option<UnixStream>]>>,
}

impl SubscriberTable {
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<Option<UnixStream>> = (0..capacity).map(|_| None).collect();
        Self {
            slots: Mutex::new(slots.into_boxed_slice()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<[Option<UnixStream>]>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.lock().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores `stream` in the first free slot and returns its index.
    ///
    /// # Errors
    ///
    /// Hands the stream back when every slot is taken.
    pub fn insert(&self, stream: UnixStream) -> Result<usize, UnixStream> {
        let mut slots = self.lock();
        match slots.iter().position(Option::is_none) {
            Some(index) => {
                slots[index] = Some(stream);
                Ok(index)
            }
            None => Err(stream),
        }
    }

    /// Sends an encoded frame to every subscriber, evicting the ones that
    /// fail.  Returns the number delivered.
    pub fn send_to_all(&self, frame: &[u8]) -> usize {
        let mut delivered = 0;
        let mut slots = self.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(stream) = slot.as_mut() else { continue };
            match send_encoded_frame(stream, frame) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    info!("observer {index} dropped: {e}");
                    *slot = None;
                }
            }
        }
        delivered
    }

    /// Closes every subscriber.
    pub fn clear(&self) {
        for slot in self.lock().iter_mut() {
            *slot = None;
        }
    }
}

// ── Hub ───────────────────────────────────────────────────────────────────────

/// The running observer server.
pub struct EventHub {
    table: Arc<SubscriberTable>,
    running: Arc<AtomicBool>,
    socket_path: PathBuf,
    waker: ListenerWaker,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventHub {
    /// Binds the configured socket and starts accepting observers.
    ///
    /// # Errors
    ///
    /// Any [`ListenError`]; the hub does not start.
    pub fn start(config: &ObserverConfig) -> Result<Self, ListenError> {
        let listener = bind_listener(&config.socket_path)?;
        Self::start_with_listener(listener, &config.socket_path, config.max_clients)
    }

    /// Starts the accept thread on an already bound listener.
    pub fn start_with_listener(
        listener: UnixListener,
        socket_path: &Path,
        max_clients: usize,
    ) -> Result<Self, ListenError> {
        let table = Arc::new(SubscriberTable::new(max_clients));
        let running = Arc::new(AtomicBool::new(true));
        let waker = ListenerWaker::new(&listener, socket_path)?;

        let worker = {
            let table = Arc::clone(&table);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || accept_loop(listener, table, running))
                .map_err(|source| ListenError::SpawnFailed {
                    name: THREAD_NAME,
                    source,
                })?
        };

        info!(
            "observer listening on {} ({max_clients} slots)",
            socket_path.display()
        );
        Ok(Self {
            table,
            running,
            socket_path: socket_path.to_path_buf(),
            waker,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Sends `event` to every connected observer.
    ///
    /// Never blocks on a peer and never fails: encoding problems are logged
    /// and delivery problems evict the subscriber concerned.
    pub fn broadcast(&self, event: &Event) {
        let mut buf = [0u8; LENGTH_PREFIX_SIZE + MAX_EVENT_SIZE];
        let len = match encode_event_into(event, &mut buf[LENGTH_PREFIX_SIZE..]) {
            Ok(len) => len,
            Err(e) => {
                error!("failed to encode {} event: {e}", event.kind());
                return;
            }
        };
        let frame = match seal_frame(&mut buf, len, MAX_EVENT_SIZE) {
            Ok(frame) => frame,
            Err(e) => {
                error!("failed to frame {} event: {e}", event.kind());
                return;
            }
        };
        let delivered = self.table.send_to_all(frame);
        trace!("{} event delivered to {delivered} observer(s)", event.kind());
    }

    pub fn subscriber_count(&self) -> usize {
        self.table.len()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops accepting, closes every observer and removes the socket file.
    /// Calling it again does nothing.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.waker.wake();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = worker {
            join_worker(handle, THREAD_NAME);
        }
        self.table.clear();
        remove_socket_file(&self.socket_path);
        info!("observer stopped");
    }
}

impl EventSink for EventHub {
    fn broadcast(&self, event: &Event) {
        EventHub::broadcast(self, event);
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: UnixListener, table: Arc<SubscriberTable>, running: Arc<AtomicBool>) {
    while let Some(stream) = accept_until_stopped(&listener, &running, THREAD_NAME) {
        if let Err(e) = stream.set_nonblocking(true) {
            warn!("failed to make observer socket non-blocking: {e}");
            continue;
        }
        match table.insert(stream) {
            Ok(index) => debug!("observer connected in slot {index}"),
            Err(_rejected) => warn!("observer table full; connection refused"),
        }
    }
    debug!("{THREAD_NAME} accept loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use keybridge_core::protocol::framing::{encode_frame, recv_frame};
    use keybridge_core::protocol::messages::KscanEvent;
    use keybridge_core::decode_event;

    fn frame_for(event: &Event) -> Vec<u8> {
        let payload = keybridge_core::encode_event(event).unwrap();
        encode_frame(&payload, MAX_EVENT_SIZE).unwrap()
    }

    fn nonblocking_pair() -> (UnixStream, UnixStream) {
        let (server, client) = UnixStream::pair().unwrap();
        server.set_nonblocking(true).unwrap();
        (server, client)
    }

    #[test]
    fn test_insert_fills_first_free_slot() {
        // Arrange
        let table = SubscriberTable::new(2);
        let (a, _ca) = nonblocking_pair();
        let (b, _cb) = nonblocking_pair();

        // Act / Assert
        assert_eq!(table.insert(a).ok(), Some(0));
        assert_eq!(table.insert(b).ok(), Some(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_insert_into_full_table_returns_stream() {
        let table = SubscriberTable::new(1);
        let (a, _ca) = nonblocking_pair();
        let (b, _cb) = nonblocking_pair();
        table.insert(a).unwrap();
        assert!(table.insert(b).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_send_to_all_evicts_closed_peer_and_reuses_slot() {
        // Arrange
        let table = SubscriberTable::new(2);
        let (a, ca) = nonblocking_pair();
        let (b, mut cb) = nonblocking_pair();
        table.insert(a).unwrap();
        table.insert(b).unwrap();
        drop(ca);
        let event = Event::Kscan(KscanEvent {
            position: 3,
            pressed: true,
            ..Default::default()
        });

        // Act
        let delivered = table.send_to_all(&frame_for(&event));

        // Assert
        assert_eq!(delivered, 1);
        assert_eq!(table.len(), 1);
        let payload = recv_frame(&mut cb, MAX_EVENT_SIZE).unwrap();
        assert_eq!(decode_event(&payload).unwrap(), event);

        let (c, _cc) = nonblocking_pair();
        assert_eq!(table.insert(c).ok(), Some(0));
    }

    #[test]
    fn test_send_to_all_evicts_congested_peer() {
        // Arrange: the peer never reads, so its buffer eventually fills.
        let table = SubscriberTable::new(1);
        let (a, _ca) = nonblocking_pair();
        table.insert(a).unwrap();
        let frame = frame_for(&Event::Kscan(KscanEvent::default()));

        // Act
        let mut rounds = 0;
        while !table.is_empty() && rounds < 1_000_000 {
            table.send_to_all(&frame);
            rounds += 1;
        }

        // Assert
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_closes_all_subscribers() {
        let table = SubscriberTable::new(3);
        let (a, _ca) = nonblocking_pair();
        table.insert(a).unwrap();
        table.clear();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), 3);
    }
}
