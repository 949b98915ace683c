//! # fsrouter wire protocol
//!
//! Fixed-size binary frames exchanged between the router, storage nodes and
//! clients. Every frame starts with a single message-type tag byte; the
//! remaining bytes are tag-specific. Frame sizes are fixed so a peer can
//! parse a whole frame with a single exact-length read.
//!
//! All multi-byte values (ports, node ids, response times) are little-endian,
//! everywhere.

pub mod error;
pub mod frame;

pub use error::{ProtoError, Result};
pub use frame::{
    decode_addr, encode_addr, encode_addr_v4, Frame, MessageType, ADDR_LEN, CONTROL_FRAME_LEN,
    JOIN_FRAME_LEN,
};
