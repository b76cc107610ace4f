//! keybridge-client library entry point.
//!
//! A client talks to a running bridge over its two sockets:
//!
//! - the observer socket, where it subscribes and reads a stream of
//!   [`keybridge_core::Event`]s ([`infrastructure::network::EventWatcher`]);
//! - the kscan socket, where it injects key presses and releases
//!   ([`infrastructure::network::KeySender`]).
//!
//! Both directions use the same framing: a 4-byte big-endian length followed
//! by one encoded message.

/// Application layer: presentation of events and key targets.
pub mod application;

/// Infrastructure layer: socket clients.
pub mod infrastructure;
