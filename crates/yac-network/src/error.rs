//! Network error types

use thiserror::Error;
use yac_primitives::Address;

/// Network errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload (de)serialization failed
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No open connection to the peer
    #[error("not connected to peer: {0}")]
    NotConnected(Address),

    /// Already connected
    #[error("already connected to peer: {0}")]
    AlreadyConnected(Address),

    /// Peer is not a cluster member
    #[error("unknown peer: {0}")]
    UnknownPeer(Address),

    /// Invalid message
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Already running
    #[error("network service already running")]
    AlreadyRunning,

    /// Outbound queue of the peer is full
    #[error("send queue full for peer: {0}")]
    QueueFull(Address),

    /// Channel closed
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;
