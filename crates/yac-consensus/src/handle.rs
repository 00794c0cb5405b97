//! Cloneable front end of a running engine

use crate::cluster_order::ClusterOrdering;
use crate::gate::HashGate;
use crate::network::YacNetworkNotifications;
use crate::types::{CommitMessage, Peer, RejectMessage, VoteMessage, YacHash};
use crate::yac::YacEvent;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Handle to a [`Yac`](crate::Yac) engine.
///
/// Every call only enqueues an event; the engine applies them one at a time
/// in arrival order. Once the engine has stopped, calls are dropped with a
/// warning.
#[derive(Clone)]
pub struct YacHandle {
    events: mpsc::UnboundedSender<YacEvent>,
    notifier: broadcast::Sender<YacHash>,
}

impl YacHandle {
    pub(crate) fn new(
        events: mpsc::UnboundedSender<YacEvent>,
        notifier: broadcast::Sender<YacHash>,
    ) -> Self {
        Self { events, notifier }
    }

    /// Enqueue a raw event
    pub fn send(&self, event: YacEvent) {
        if self.events.send(event).is_err() {
            warn!("YAC engine stopped, event dropped");
        }
    }

    /// Ask the engine loop to stop after the events already queued
    pub fn shutdown(&self) {
        self.send(YacEvent::Shutdown);
    }

    /// Whether the engine task has stopped
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

impl HashGate for YacHandle {
    fn vote(&self, hash: YacHash, order: ClusterOrdering) {
        self.send(YacEvent::Vote { hash, order });
    }

    fn subscribe_commits(&self) -> broadcast::Receiver<YacHash> {
        self.notifier.subscribe()
    }
}

impl YacNetworkNotifications for YacHandle {
    fn on_vote(&self, from: Peer, vote: VoteMessage) {
        self.send(YacEvent::VoteReceived { from, vote });
    }

    fn on_commit(&self, from: Peer, commit: CommitMessage) {
        self.send(YacEvent::CommitReceived { from, commit });
    }

    fn on_reject(&self, from: Peer, reject: RejectMessage) {
        self.send(YacEvent::RejectReceived { from, reject });
    }
}
