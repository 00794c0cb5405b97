//! Round-scoped view of the cluster

use crate::error::{ConsensusError, ConsensusResult};
use crate::types::Peer;
use std::collections::HashSet;
use yac_primitives::Address;

/// Ordered peer list for one round plus a fanout cursor.
///
/// The ordering fixes both the supermajority threshold and the order in
/// which vote retransmissions walk the cluster.
#[derive(Debug, Clone)]
pub struct ClusterOrdering {
    peers: Vec<Peer>,
    cursor: usize,
}

impl ClusterOrdering {
    /// Build an ordering from a non-empty list of distinct peers
    pub fn new(peers: Vec<Peer>) -> ConsensusResult<Self> {
        if peers.is_empty() {
            return Err(ConsensusError::EmptyOrdering);
        }
        let mut seen = HashSet::with_capacity(peers.len());
        for peer in &peers {
            if !seen.insert(peer.id) {
                return Err(ConsensusError::DuplicatePeer(peer.id));
            }
        }
        Ok(Self { peers, cursor: 0 })
    }

    /// Cluster size `n`
    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Tolerated faulty peers, `f = (n - 1) / 3`
    pub fn fault_tolerance(&self) -> usize {
        (self.size() - 1) / 3
    }

    /// Votes needed to commit: `2f + 1`, raised to a strict majority
    /// for the sizes (2, 3, 6) where `2f + 1` alone would not exceed `n / 2`.
    ///
    /// Any two sets of this size intersect, so two hashes can never both
    /// reach it when each peer votes once.
    pub fn supermajority(&self) -> usize {
        (2 * self.fault_tolerance() + 1).max(self.size() / 2 + 1)
    }

    /// Peers in order
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    /// Peer at `index`, wrapping around the ordering
    pub fn peer_at(&self, index: usize) -> &Peer {
        &self.peers[index % self.peers.len()]
    }

    /// Peer under the cursor
    pub fn current(&self) -> &Peer {
        self.peer_at(self.cursor)
    }

    /// Cursor position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to the next peer, wrapping at the end
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.peers.len();
    }

    /// Check membership
    pub fn contains(&self, id: &Address) -> bool {
        self.peers.iter().any(|p| &p.id == id)
    }
}
