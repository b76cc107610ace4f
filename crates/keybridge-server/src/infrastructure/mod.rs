//! Infrastructure layer: sockets and the file system.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keybridge_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
