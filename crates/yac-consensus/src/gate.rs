//! Upstream-facing consensus gate

use crate::cluster_order::ClusterOrdering;
use crate::types::YacHash;
use tokio::sync::broadcast;

/// Entry point for block production: submit a candidate, observe outcomes.
pub trait HashGate: Send + Sync {
    /// Start a round voting for `hash` over `order`
    fn vote(&self, hash: YacHash, order: ClusterOrdering);

    /// Subscribe to committed hashes.
    ///
    /// One value per committed round. Dropping the receiver detaches; a
    /// subscriber that falls behind the channel capacity skips the oldest
    /// values instead of stalling the engine.
    fn subscribe_commits(&self) -> broadcast::Receiver<YacHash>;
}
