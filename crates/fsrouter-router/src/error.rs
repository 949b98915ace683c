use fsrouter_proto::ProtoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    /// Wrong frame size, unknown tag, bad address family. Connection-local.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtoError),

    /// The scheduling engine has no joined nodes to dispatch to.
    #[error("no nodes available")]
    NoNodesAvailable,

    /// A node's stored index no longer addresses it in the engine's
    /// backing array.
    #[error("stale scheduler index {index} for node {node_id}")]
    StaleIndex { node_id: u16, index: usize },

    #[error("unknown scheduling policy: {0:?}")]
    UnknownPolicy(String),

    /// No pending entry for the client a port-forward frame names.
    #[error("no pending client for address {0}")]
    ClientNotFound(String),

    /// The node's writer task is gone; its outbound queue is closed.
    #[error("outbound queue for node {0} is closed")]
    NodeGone(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;
