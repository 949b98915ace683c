use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::error::{ProtoError, Result};

/// Encoded socket address: 4 IPv4 octets followed by a little-endian port.
pub const ADDR_LEN: usize = 6;
/// Size of a `NodeJoin` frame: tag + node id.
pub const JOIN_FRAME_LEN: usize = 3;
/// Size of every other payload-carrying frame.
pub const CONTROL_FRAME_LEN: usize = 16;

/// Message-type tag carried in byte 0 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// A storage node announcing itself, carrying its self-assigned id.
    NodeJoin = 0,
    /// A client requesting a node, carrying its return address.
    ClientJoin = 1,
    /// A node relaying the data-transfer listener it opened for a client.
    PortForward = 2,
    /// A node reporting its average response time after serving a request.
    HealthCheck = 3,
    /// Terminates the router's accept loop.
    Shutdown = 4,
}

impl MessageType {
    /// The fixed size of a frame with this tag, including the tag byte.
    pub fn frame_len(self) -> usize {
        match self {
            MessageType::NodeJoin => JOIN_FRAME_LEN,
            MessageType::Shutdown => 1,
            MessageType::ClientJoin | MessageType::PortForward | MessageType::HealthCheck => {
                CONTROL_FRAME_LEN
            }
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtoError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(MessageType::NodeJoin),
            1 => Ok(MessageType::ClientJoin),
            2 => Ok(MessageType::PortForward),
            3 => Ok(MessageType::HealthCheck),
            4 => Ok(MessageType::Shutdown),
            other => Err(ProtoError::UnknownTag(other)),
        }
    }
}

/// Encodes an IPv4 socket address into its 6-byte wire form.
pub fn encode_addr_v4(addr: &SocketAddrV4) -> [u8; ADDR_LEN] {
    let mut buf = [0u8; ADDR_LEN];
    buf[..4].copy_from_slice(&addr.ip().octets());
    buf[4..].copy_from_slice(&addr.port().to_le_bytes());
    buf
}

/// Encodes a socket address into its 6-byte wire form.
///
/// Fails with [`ProtoError::MalformedAddress`] for anything but IPv4; the
/// protocol has no representation for other address families.
pub fn encode_addr(addr: &SocketAddr) -> Result<[u8; ADDR_LEN]> {
    match addr {
        SocketAddr::V4(v4) => Ok(encode_addr_v4(v4)),
        SocketAddr::V6(v6) => Err(ProtoError::MalformedAddress(format!(
            "expected an IPv4 address, got {v6}"
        ))),
    }
}

/// Decodes the first 6 bytes of `buf` as an IPv4 socket address.
pub fn decode_addr(buf: &[u8]) -> Result<SocketAddrV4> {
    if buf.len() < ADDR_LEN {
        return Err(ProtoError::ShortAddress { got: buf.len() });
    }
    let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let port = u16::from_le_bytes([buf[4], buf[5]]);
    Ok(SocketAddrV4::new(ip, port))
}

/// Decoded view of one wire frame.
///
/// Reserved trailing bytes are ignored on decode and zeroed on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    NodeJoin {
        node_id: u16,
    },
    ClientJoin {
        return_addr: SocketAddrV4,
    },
    PortForward {
        client_addr: SocketAddrV4,
        listener_addr: SocketAddrV4,
    },
    HealthCheck {
        /// Moving average computed by the node itself, in nanoseconds.
        avg_response_ns: f64,
    },
    Shutdown,
}

impl Frame {
    pub fn message_type(&self) -> MessageType {
        match self {
            Frame::NodeJoin { .. } => MessageType::NodeJoin,
            Frame::ClientJoin { .. } => MessageType::ClientJoin,
            Frame::PortForward { .. } => MessageType::PortForward,
            Frame::HealthCheck { .. } => MessageType::HealthCheck,
            Frame::Shutdown => MessageType::Shutdown,
        }
    }

    /// Decodes a complete frame, tag byte included.
    ///
    /// `buf` must hold at least the fixed size the tag calls for; anything
    /// shorter is a protocol violation.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let tag = *buf.first().ok_or(ProtoError::ShortFrame { expected: 1 })?;
        let msg_type = MessageType::try_from(tag)?;
        if buf.len() < msg_type.frame_len() {
            return Err(ProtoError::ShortFrame {
                expected: msg_type.frame_len(),
            });
        }

        match msg_type {
            MessageType::NodeJoin => Ok(Frame::NodeJoin {
                node_id: u16::from_le_bytes([buf[1], buf[2]]),
            }),
            MessageType::ClientJoin => Ok(Frame::ClientJoin {
                return_addr: decode_addr(&buf[1..1 + ADDR_LEN])?,
            }),
            MessageType::PortForward => Ok(Frame::PortForward {
                client_addr: decode_addr(&buf[1..1 + ADDR_LEN])?,
                listener_addr: decode_addr(&buf[1 + ADDR_LEN..1 + 2 * ADDR_LEN])?,
            }),
            MessageType::HealthCheck => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[1..9]);
                Ok(Frame::HealthCheck {
                    avg_response_ns: f64::from_le_bytes(raw),
                })
            }
            MessageType::Shutdown => Ok(Frame::Shutdown),
        }
    }

    /// Encodes the frame into its fixed-size wire form.
    pub fn encode(&self) -> Vec<u8> {
        let msg_type = self.message_type();
        let mut buf = vec![0u8; msg_type.frame_len()];
        buf[0] = msg_type as u8;

        match self {
            Frame::NodeJoin { node_id } => {
                buf[1..3].copy_from_slice(&node_id.to_le_bytes());
            }
            Frame::ClientJoin { return_addr } => {
                buf[1..1 + ADDR_LEN].copy_from_slice(&encode_addr_v4(return_addr));
            }
            Frame::PortForward {
                client_addr,
                listener_addr,
            } => {
                buf[1..1 + ADDR_LEN].copy_from_slice(&encode_addr_v4(client_addr));
                buf[1 + ADDR_LEN..1 + 2 * ADDR_LEN]
                    .copy_from_slice(&encode_addr_v4(listener_addr));
            }
            Frame::HealthCheck { avg_response_ns } => {
                buf[1..9].copy_from_slice(&avg_response_ns.to_le_bytes());
            }
            Frame::Shutdown => {}
        }

        buf
    }
}
