//! Wire codec and framing for the observer and kscan sockets.

pub mod codec;
pub mod framing;
pub mod messages;
pub mod wire;

pub use codec::{
    decode_client_message, decode_event, encode_client_message, encode_event, DecodeError,
    EncodeError,
};
pub use framing::{recv_frame, send_frame, write_frame, FrameError};
pub use messages::*;
