//! Domain types shared by the device side and clients.
//!
//! Nothing in here touches sockets or the wire format; the protocol module
//! builds on these types.

/// Transport endpoints and descriptor parsing.
pub mod endpoint;

/// Key matrix geometry and linear-address resolution.
pub mod matrix;
