//! Consensus types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use yac_crypto::{encode_public_key, keccak256_concat, public_key_to_address, PublicKey};
use yac_primitives::{Address, Round, H256};

/// Domain separator prepended to every vote signing digest
const VOTE_DOMAIN: &[u8] = b"yac-vote";

/// Cluster member
///
/// Equality and hashing use the identifier only.
#[derive(Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Peer identifier (address derived from the public key)
    pub id: Address,
    /// Network address, `host:port`
    pub address: String,
    /// SEC1-encoded public key
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl Peer {
    /// Create a peer from its parts
    pub fn new(id: Address, address: impl Into<String>, public_key: Vec<u8>) -> Self {
        Self {
            id,
            address: address.into(),
            public_key,
        }
    }

    /// Create a peer whose identifier is derived from `public_key`
    pub fn from_public_key(address: impl Into<String>, public_key: &PublicKey) -> Self {
        Self {
            id: public_key_to_address(public_key),
            address: address.into(),
            public_key: encode_public_key(public_key),
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({} @ {})", self.id, self.address)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Candidate outcome of a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YacHash {
    /// Round this candidate belongs to
    pub round: Round,
    /// Hash of the proposal the block was built from
    pub proposal_hash: H256,
    /// Hash of the candidate block
    pub block_hash: H256,
}

impl YacHash {
    /// Create a new candidate hash
    pub fn new(round: Round, proposal_hash: H256, block_hash: H256) -> Self {
        Self {
            round,
            proposal_hash,
            block_hash,
        }
    }

    /// Digest signed by a vote for this hash
    pub fn signing_digest(&self) -> H256 {
        keccak256_concat(&[
            VOTE_DOMAIN,
            &self.round.to_le_bytes(),
            self.proposal_hash.as_bytes(),
            self.block_hash.as_bytes(),
        ])
    }
}

impl fmt::Display for YacHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r{}:{}/{}",
            self.round,
            self.proposal_hash.short(),
            self.block_hash.short()
        )
    }
}

/// Signed endorsement of a hash by one peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteMessage {
    /// Endorsed hash
    pub hash: YacHash,
    /// Voting peer
    pub peer: Peer,
    /// Signature over `hash.signing_digest()`
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl VoteMessage {
    /// Create a vote
    pub fn new(hash: YacHash, peer: Peer, signature: Vec<u8>) -> Self {
        Self {
            hash,
            peer,
            signature,
        }
    }

    /// Identifier of the voter
    pub fn voter(&self) -> Address {
        self.peer.id
    }
}

/// Proof that a hash reached supermajority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
    /// Votes for the committed hash
    pub votes: Vec<VoteMessage>,
}

impl CommitMessage {
    /// Wrap a set of votes
    pub fn new(votes: Vec<VoteMessage>) -> Self {
        Self { votes }
    }

    /// Hash endorsed by the first vote
    pub fn hash(&self) -> Option<&YacHash> {
        self.votes.first().map(|v| &v.hash)
    }
}

/// Proof that no hash can reach supermajority this round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectMessage {
    /// Votes cast in the round, spanning several hashes
    pub votes: Vec<VoteMessage>,
}

impl RejectMessage {
    /// Wrap a set of votes
    pub fn new(votes: Vec<VoteMessage>) -> Self {
        Self { votes }
    }

    /// Round named by the first vote
    pub fn round(&self) -> Option<Round> {
        self.votes.first().map(|v| v.hash.round)
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YacState {
    /// No active round
    Idle,
    /// Own vote broadcast, collecting peer votes
    Voting,
    /// Round finished with this hash
    Committed(YacHash),
    /// Round finished without a winner
    Rejected(Round),
}

impl YacState {
    /// Whether the round has resolved
    pub fn is_terminal(&self) -> bool {
        matches!(self, YacState::Committed(_) | YacState::Rejected(_))
    }
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(de::Error::custom)
    }
}
