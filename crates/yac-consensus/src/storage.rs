//! Per-round vote bookkeeping

use crate::types::{VoteMessage, YacHash};
use std::collections::{HashMap, HashSet};
use yac_primitives::Address;

/// Result of registering a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Vote stored
    Accepted,
    /// Voter already has a vote this round
    DuplicatePeer,
    /// Round already resolved, state is frozen
    AlreadyResolved,
}

/// Votes collected in one round, bucketed by hash.
///
/// Every peer votes at most once; re-votes are refused even for the same
/// hash. Buckets keep insertion order, and hashes are iterated in the order
/// their first vote arrived.
#[derive(Debug, Clone, Default)]
pub struct VoteRoundState {
    votes: HashMap<YacHash, Vec<VoteMessage>>,
    hash_order: Vec<YacHash>,
    voted_peers: HashSet<Address>,
    resolved: bool,
}

impl VoteRoundState {
    /// Create empty round state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote
    pub fn register_vote(&mut self, vote: VoteMessage) -> RegisterOutcome {
        if self.resolved {
            return RegisterOutcome::AlreadyResolved;
        }
        if !self.voted_peers.insert(vote.voter()) {
            return RegisterOutcome::DuplicatePeer;
        }
        let hash = vote.hash;
        let bucket = self.votes.entry(hash).or_default();
        if bucket.is_empty() {
            self.hash_order.push(hash);
        }
        bucket.push(vote);
        RegisterOutcome::Accepted
    }

    /// Hash whose bucket holds at least `threshold` votes
    pub fn supermajority_hash(&self, threshold: usize) -> Option<YacHash> {
        self.hash_order
            .iter()
            .find(|h| self.count_for(h) >= threshold)
            .copied()
    }

    /// True when no hash can reach `threshold` even if every one of the
    /// `remaining` unvoted peers endorsed it.
    pub fn is_rejectable(&self, threshold: usize, remaining: usize) -> bool {
        if self.supermajority_hash(threshold).is_some() {
            return false;
        }
        // An unseen hash starts from zero, so max_count = 0 covers it.
        let max_count = self.hash_order.iter().map(|h| self.count_for(h)).max().unwrap_or(0);
        max_count + remaining < threshold
    }

    /// Votes recorded for `hash`, in arrival order
    pub fn votes_for(&self, hash: &YacHash) -> &[VoteMessage] {
        self.votes.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of votes for `hash`
    pub fn count_for(&self, hash: &YacHash) -> usize {
        self.votes.get(hash).map_or(0, Vec::len)
    }

    /// Every vote of the round, grouped by hash
    pub fn all_votes(&self) -> Vec<VoteMessage> {
        self.hash_order
            .iter()
            .flat_map(|h| self.votes_for(h).iter().cloned())
            .collect()
    }

    /// Distinct hashes seen so far
    pub fn hashes(&self) -> &[YacHash] {
        &self.hash_order
    }

    /// Whether `peer` has voted
    pub fn has_voted(&self, peer: &Address) -> bool {
        self.voted_peers.contains(peer)
    }

    /// Number of peers that have voted
    pub fn voted_count(&self) -> usize {
        self.voted_peers.len()
    }

    /// Freeze the state; later registrations return `AlreadyResolved`
    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peer;
    use proptest::prelude::*;
    use yac_primitives::H256;

    fn peer(n: u8) -> Peer {
        Peer::new(Address::from_bytes([n; 20]), format!("p{}", n), vec![])
    }

    fn hash(n: u8) -> YacHash {
        YacHash::new(1, H256::from_bytes([n; 32]), H256::from_bytes([n; 32]))
    }

    fn vote(p: u8, h: u8) -> VoteMessage {
        VoteMessage::new(hash(h), peer(p), vec![p])
    }

    #[test]
    fn test_register_and_count() {
        let mut state = VoteRoundState::new();
        assert_eq!(state.register_vote(vote(1, 10)), RegisterOutcome::Accepted);
        assert_eq!(state.register_vote(vote(2, 10)), RegisterOutcome::Accepted);
        assert_eq!(state.register_vote(vote(3, 20)), RegisterOutcome::Accepted);

        assert_eq!(state.count_for(&hash(10)), 2);
        assert_eq!(state.count_for(&hash(20)), 1);
        assert_eq!(state.voted_count(), 3);
        assert!(state.has_voted(&peer(2).id));
        assert_eq!(state.hashes(), &[hash(10), hash(20)]);
    }

    #[test]
    fn test_duplicate_peer_same_hash() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        assert_eq!(state.register_vote(vote(1, 10)), RegisterOutcome::DuplicatePeer);
        assert_eq!(state.count_for(&hash(10)), 1);
        assert_eq!(state.voted_count(), 1);
    }

    #[test]
    fn test_duplicate_peer_other_hash() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        assert_eq!(state.register_vote(vote(1, 20)), RegisterOutcome::DuplicatePeer);
        assert_eq!(state.count_for(&hash(20)), 0);
        assert_eq!(state.hashes().len(), 1);
    }

    #[test]
    fn test_resolved_state_is_frozen() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        state.resolve();
        assert_eq!(state.register_vote(vote(2, 10)), RegisterOutcome::AlreadyResolved);
        assert_eq!(state.voted_count(), 1);
    }

    #[test]
    fn test_supermajority_hash() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        state.register_vote(vote(2, 10));
        assert_eq!(state.supermajority_hash(3), None);
        state.register_vote(vote(3, 10));
        assert_eq!(state.supermajority_hash(3), Some(hash(10)));
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(3, 10));
        state.register_vote(vote(1, 20));
        state.register_vote(vote(2, 10));

        let voters: Vec<_> = state.votes_for(&hash(10)).iter().map(|v| v.voter()).collect();
        assert_eq!(voters, vec![peer(3).id, peer(2).id]);

        let all: Vec<_> = state.all_votes().iter().map(|v| v.voter()).collect();
        assert_eq!(all, vec![peer(3).id, peer(2).id, peer(1).id]);
    }

    #[test]
    fn test_rejectable_split_with_no_remaining() {
        // n = 4, t = 3: two votes each for A and B
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        state.register_vote(vote(2, 10));
        state.register_vote(vote(3, 20));
        state.register_vote(vote(4, 20));
        assert!(state.is_rejectable(3, 0));
    }

    #[test]
    fn test_not_rejectable_with_outstanding_peer() {
        // n = 4, t = 3: A has 2, B has 1, one peer left could lift A to 3
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        state.register_vote(vote(2, 10));
        state.register_vote(vote(3, 20));
        assert!(!state.is_rejectable(3, 1));
    }

    #[test]
    fn test_rejectable_three_way_split() {
        let mut state = VoteRoundState::new();
        state.register_vote(vote(1, 10));
        state.register_vote(vote(2, 20));
        state.register_vote(vote(3, 30));
        assert!(state.is_rejectable(3, 1));
    }

    #[test]
    fn test_empty_state_not_rejectable() {
        let state = VoteRoundState::new();
        assert!(!state.is_rejectable(3, 4));
    }

    #[test]
    fn test_committed_state_not_rejectable() {
        let mut state = VoteRoundState::new();
        for p in 1..=3 {
            state.register_vote(vote(p, 10));
        }
        assert!(!state.is_rejectable(3, 0));
    }

    proptest! {
        /// Any delivery sequence where each peer votes once yields at most
        /// one hash at or above the threshold.
        #[test]
        fn prop_single_supermajority(
            n in 1usize..25,
            choices in proptest::collection::vec((0u8..25, 0u8..4), 0..60),
        ) {
            let f = (n - 1) / 3;
            let threshold = (2 * f + 1).max(n / 2 + 1);
            let mut state = VoteRoundState::new();
            for (p, h) in choices {
                if (p as usize) < n {
                    state.register_vote(vote(p, h));
                }
            }
            let winners = state
                .hashes()
                .iter()
                .filter(|h| state.count_for(h) >= threshold)
                .count();
            prop_assert!(winners <= 1);
            prop_assert!(state.voted_count() <= n);
        }
    }
}
