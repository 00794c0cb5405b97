//! Crypto provider boundary

use crate::error::ConsensusResult;
use crate::types::{CommitMessage, Peer, RejectMessage, VoteMessage, YacHash};
use tracing::debug;
use yac_crypto::{decode_public_key, public_key_to_address, sign, verify, PrivateKey, Signature};

/// Signing and verification of YAC messages.
///
/// Implementations must be callable from the engine's task; they carry no
/// mutable state into the engine.
pub trait YacCryptoProvider: Send + Sync {
    /// Produce this peer's signed vote for `hash`
    fn sign(&self, hash: &YacHash) -> ConsensusResult<VoteMessage>;

    /// Check a single vote's signature against its peer
    fn verify_vote(&self, vote: &VoteMessage) -> bool;

    /// Check every signature of a commit
    fn verify_commit(&self, commit: &CommitMessage) -> bool {
        commit.votes.iter().all(|v| self.verify_vote(v))
    }

    /// Check every signature of a reject
    fn verify_reject(&self, reject: &RejectMessage) -> bool {
        reject.votes.iter().all(|v| self.verify_vote(v))
    }

    /// Aggregate votes for one hash into a commit
    fn build_commit(&self, votes: Vec<VoteMessage>) -> CommitMessage {
        CommitMessage::new(votes)
    }

    /// Aggregate the round's votes into a reject
    fn build_reject(&self, votes: Vec<VoteMessage>) -> RejectMessage {
        RejectMessage::new(votes)
    }
}

/// secp256k1 provider: votes carry a 65-byte `r || s || v` signature over
/// [`YacHash::signing_digest`].
pub struct Secp256k1CryptoProvider {
    key: PrivateKey,
    peer: Peer,
}

impl Secp256k1CryptoProvider {
    /// Create a provider signing as the peer reachable at `address`
    pub fn new(key: PrivateKey, address: impl Into<String>) -> Self {
        let peer = Peer::from_public_key(address, key.verifying_key());
        Self { key, peer }
    }

    /// The peer this provider signs for
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn check_vote(vote: &VoteMessage) -> Result<bool, yac_crypto::CryptoError> {
        let public_key = decode_public_key(&vote.peer.public_key)?;
        if public_key_to_address(&public_key) != vote.peer.id {
            return Ok(false);
        }
        let signature = Signature::from_slice(&vote.signature)?;
        verify(&vote.hash.signing_digest(), &signature, &public_key)
    }
}

impl YacCryptoProvider for Secp256k1CryptoProvider {
    fn sign(&self, hash: &YacHash) -> ConsensusResult<VoteMessage> {
        let signature = sign(&hash.signing_digest(), &self.key)?;
        Ok(VoteMessage::new(
            *hash,
            self.peer.clone(),
            signature.to_bytes().to_vec(),
        ))
    }

    fn verify_vote(&self, vote: &VoteMessage) -> bool {
        match Self::check_vote(vote) {
            Ok(valid) => valid,
            Err(e) => {
                debug!(peer = %vote.peer, error = %e, "Malformed vote signature");
                false
            }
        }
    }
}
