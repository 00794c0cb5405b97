//! # yac-consensus
//!
//! YAC (Yet Another Consensus) voting core.
//!
//! This crate provides:
//! - Cluster ordering and supermajority thresholds
//! - Per-round vote collection
//! - The voting state machine (vote, commit, reject, retransmission)
//! - Crypto, network and timer boundaries
//!
//! ## Architecture
//!
//! ```text
//!   HashGate::vote        YacNetworkNotifications
//!        |                         |
//!        +-----------+-------------+
//!                    v
//! +--------------------------------------+
//! |  YacHandle  (enqueue YacEvent)       |
//! +--------------------------------------+
//!                    |  mpsc
//! +--------------------------------------+
//! |  Yac  (one task, &mut self)          |  <- owns round state
//! +--------------------------------------+
//!      |             |             |
//!  YacNetwork   YacCryptoProvider  Timer
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use yac_consensus::{HashGate, Yac, YacConfig, TokioTimer};
//!
//! let (handle, _task) = Yac::spawn(network, crypto, Arc::new(TokioTimer::new()), order.clone(), YacConfig::default());
//! let mut commits = handle.subscribe_commits();
//! handle.vote(hash, order);
//! let committed = commits.recv().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod cluster_order;
mod config;
mod crypto;
mod error;
mod gate;
mod handle;
mod network;
mod storage;
mod timer;
mod types;
mod yac;

pub use cluster_order::ClusterOrdering;
pub use config::YacConfig;
pub use crypto::{Secp256k1CryptoProvider, YacCryptoProvider};
pub use error::{ConsensusError, ConsensusResult};
pub use gate::HashGate;
pub use handle::YacHandle;
pub use network::{YacNetwork, YacNetworkNotifications};
pub use storage::{RegisterOutcome, VoteRoundState};
pub use timer::{ManualTimer, Timer, TimerCallback, TimerHandle, TokioTimer};
pub use types::{CommitMessage, Peer, RejectMessage, VoteMessage, YacHash, YacState};
pub use yac::{Yac, YacEvent};
