//! # keybridge-core
//!
//! Shared library for the keybridge IPC bridge: the message schema, its
//! Protocol-Buffers wire codec, length-prefix framing and key matrix
//! addressing.
//!
//! The bridge exposes two Unix-domain sockets on the device side:
//!
//! - the **observer** socket, where any number of watchers receive a stream of
//!   [`Event`]s (raw key-switch transitions and outgoing HID reports);
//! - the **kscan** socket, where one client injects [`KeyEvent`]s into the
//!   key matrix as if switches had been pressed.
//!
//! Both directions use `[u32 BE length][payload]` frames, with a per-direction
//! maximum payload size (see [`protocol::framing`]).
//!
//! This crate does not open sockets: framing is generic over
//! [`std::io::Read`] and [`std::io::Write`], so the server and client crates
//! (and tests) plug in whatever stream they have.

pub mod domain;
pub mod protocol;

pub use domain::endpoint::{Endpoint, TransportType};
pub use domain::matrix::{AddressError, MatrixCoordinate, MatrixGeometry};
pub use protocol::codec::{
    decode_client_message, decode_event, encode_client_message, encode_event, DecodeError,
    EncodeError,
};
pub use protocol::framing::FrameError;
pub use protocol::messages::{
    ClientMessage, ClientPayload, Event, KeyAction, KeyAddress, KeyEvent, KeyPosition,
    MAX_CLIENT_MESSAGE_SIZE, MAX_EVENT_SIZE,
};
