//! # yac-network
//!
//! TCP transport for the YAC consensus engine.
//!
//! This crate provides:
//! - Length-prefixed message framing with JSON consensus payloads
//! - Protocol handshake binding a connection to a cluster member
//! - Peer tracking and a reconnecting dialer
//! - A [`yac_consensus::YacNetwork`] implementation with non-blocking sends
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+
//! |  NetworkService   |  <- YacNetwork, delivers to YacNetworkNotifications
//! +-------------------+
//!          |
//! +--------+--------+
//! | Listen |  Dial  |  <- TCP connections
//! +--------+--------+
//!          |
//! +-------------------+
//! |   PeerManager     |  <- Peer tracking
//! +-------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use yac_network::{NetworkConfig, NetworkService};
//!
//! let network = NetworkService::new(config, members);
//! let (handle, _task) = Yac::spawn(Arc::new(network.clone()), crypto, timer, order, yac_config);
//! network.set_handler(Arc::new(handle.clone()));
//! network.start().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod peer;
mod service;
mod types;

pub use error::{NetworkError, NetworkResult};
pub use peer::{read_message, write_message, PeerConnection, PeerInfo, PeerManager};
pub use service::{NetworkConfig, NetworkService};
pub use types::{ConsensusPayload, Handshake, Message, MessageType, MAX_MESSAGE_SIZE};
