use thiserror::Error;

/// Protocol violations. These are always connection-local: the offending
/// connection gets closed, the process keeps running.
#[derive(Error, Debug, PartialEq)]
pub enum ProtoError {
    #[error("unknown message tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("short frame: requires {expected} bytes")]
    ShortFrame { expected: usize },

    #[error("short address buffer: need 6 bytes, got {got}")]
    ShortAddress { got: usize },

    #[error("malformed address: {0}")]
    MalformedAddress(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;
