//! Consensus error types

use yac_primitives::{Address, Round};
use thiserror::Error;

/// Consensus errors
///
/// Raised by verification helpers and constructors. The engine's inbound
/// entry points treat every variant as protocol noise and never surface
/// them to the transport.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Cluster ordering built from an empty peer list
    #[error("cluster ordering must contain at least one peer")]
    EmptyOrdering,

    /// Same peer appears twice where only one entry is allowed
    #[error("duplicate peer {0}")]
    DuplicatePeer(Address),

    /// Peer is not a member of the current ordering
    #[error("peer {0} is not in the cluster ordering")]
    UnknownPeer(Address),

    /// Message belongs to another round
    #[error("wrong round: expected {expected}, got {got}")]
    WrongRound {
        /// Current round
        expected: Round,
        /// Round named by the message
        got: Round,
    },

    /// Signature verification failed
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Aggregate carries too few votes
    #[error("insufficient votes: required {required}, got {got}")]
    InsufficientVotes {
        /// Supermajority threshold
        required: usize,
        /// Votes present
        got: usize,
    },

    /// Commit votes endorse different hashes
    #[error("commit votes endorse different hashes")]
    MixedHashes,

    /// Reject votes do not prove that no hash can win
    #[error("reject does not satisfy the impossibility condition")]
    NotRejectable,

    /// Crypto provider failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<yac_crypto::CryptoError> for ConsensusError {
    fn from(err: yac_crypto::CryptoError) -> Self {
        ConsensusError::Crypto(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
