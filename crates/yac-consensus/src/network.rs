//! Network provider boundary

use crate::types::{CommitMessage, Peer, RejectMessage, VoteMessage};

/// Outbound transport used by the engine.
///
/// Sends are fire-and-forget: the engine assumes no delivery guarantee and
/// relies on retransmission for liveness.
pub trait YacNetwork: Send + Sync {
    /// Send a vote to `to`
    fn send_vote(&self, to: &Peer, vote: VoteMessage);

    /// Send a commit to `to`
    fn send_commit(&self, to: &Peer, commit: CommitMessage);

    /// Send a reject to `to`
    fn send_reject(&self, to: &Peer, reject: RejectMessage);
}

/// Inbound delivery hooks invoked by the transport
pub trait YacNetworkNotifications: Send + Sync {
    /// A vote arrived from `from`
    fn on_vote(&self, from: Peer, vote: VoteMessage);

    /// A commit arrived from `from`
    fn on_commit(&self, from: Peer, commit: CommitMessage);

    /// A reject arrived from `from`
    fn on_reject(&self, from: Peer, reject: RejectMessage);
}
