//! YAC consensus state machine

use crate::cluster_order::ClusterOrdering;
use crate::config::YacConfig;
use crate::crypto::YacCryptoProvider;
use crate::error::{ConsensusError, ConsensusResult};
use crate::handle::YacHandle;
use crate::network::YacNetwork;
use crate::storage::{RegisterOutcome, VoteRoundState};
use crate::timer::{Timer, TimerHandle};
use crate::types::{CommitMessage, Peer, RejectMessage, VoteMessage, YacHash, YacState};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use yac_primitives::{Address, Round};

/// Input to the engine. Every mutation of round state arrives as one of these.
#[derive(Debug, Clone)]
pub enum YacEvent {
    /// Upstream asks to vote for a hash
    Vote {
        /// Candidate
        hash: YacHash,
        /// Ordering for the new round
        order: ClusterOrdering,
    },
    /// Vote delivered by the transport
    VoteReceived {
        /// Delivering peer
        from: Peer,
        /// The vote
        vote: VoteMessage,
    },
    /// Commit delivered by the transport
    CommitReceived {
        /// Delivering peer
        from: Peer,
        /// The commit
        commit: CommitMessage,
    },
    /// Reject delivered by the transport
    RejectReceived {
        /// Delivering peer
        from: Peer,
        /// The reject
        reject: RejectMessage,
    },
    /// Retransmission timer expired
    VotingStep {
        /// Hash being voted for when the timer was armed
        hash: YacHash,
        /// Engine epoch when the timer was armed
        epoch: u64,
    },
    /// Stop the engine loop
    Shutdown,
}

/// State of the round in progress
struct RoundContext {
    hash: YacHash,
    own_vote: VoteMessage,
    votes: VoteRoundState,
}

/// YAC consensus engine.
///
/// Owns the current round exclusively. All methods take `&mut self` and run
/// to completion; callers serialize access by feeding [`YacEvent`]s through
/// the single queue returned by [`Yac::new`] (see [`Yac::run`]).
pub struct Yac {
    network: Arc<dyn YacNetwork>,
    crypto: Arc<dyn YacCryptoProvider>,
    timer: Arc<dyn Timer>,
    config: YacConfig,
    events: mpsc::UnboundedSender<YacEvent>,
    notifier: broadcast::Sender<YacHash>,
    cluster_order: ClusterOrdering,
    round: Option<RoundContext>,
    state: YacState,
    current_round: Option<Round>,
    epoch: u64,
    timer_handle: Option<TimerHandle>,
}

impl Yac {
    /// Create an engine and the receiving end of its event queue
    pub fn new(
        network: Arc<dyn YacNetwork>,
        crypto: Arc<dyn YacCryptoProvider>,
        timer: Arc<dyn Timer>,
        order: ClusterOrdering,
        config: YacConfig,
    ) -> (Self, mpsc::UnboundedReceiver<YacEvent>) {
        let config = config.normalized();
        let (events, rx) = mpsc::unbounded_channel();
        let (notifier, _) = broadcast::channel(config.commit_channel_capacity);
        let yac = Self {
            network,
            crypto,
            timer,
            config,
            events,
            notifier,
            cluster_order: order,
            round: None,
            state: YacState::Idle,
            current_round: None,
            epoch: 0,
            timer_handle: None,
        };
        (yac, rx)
    }

    /// Create an engine and run it on its own tokio task
    pub fn spawn(
        network: Arc<dyn YacNetwork>,
        crypto: Arc<dyn YacCryptoProvider>,
        timer: Arc<dyn Timer>,
        order: ClusterOrdering,
        config: YacConfig,
    ) -> (YacHandle, JoinHandle<()>) {
        let (yac, rx) = Self::new(network, crypto, timer, order, config);
        let handle = yac.handle();
        let task = tokio::spawn(yac.run(rx));
        (handle, task)
    }

    /// Drain the event queue until [`YacEvent::Shutdown`].
    ///
    /// The engine keeps a sender for its own timer callbacks, so the queue
    /// never closes on its own.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<YacEvent>) {
        info!(peers = self.cluster_order.size(), "YAC engine started");
        while let Some(event) = rx.recv().await {
            let stop = matches!(event, YacEvent::Shutdown);
            self.handle_event(event);
            if stop {
                break;
            }
        }
        info!("YAC engine stopped");
    }

    /// Handle to this engine's event queue and commit channel
    pub fn handle(&self) -> YacHandle {
        YacHandle::new(self.events.clone(), self.notifier.clone())
    }

    /// Subscribe to committed hashes
    pub fn subscribe_commits(&self) -> broadcast::Receiver<YacHash> {
        self.notifier.subscribe()
    }

    /// Apply one event
    pub fn handle_event(&mut self, event: YacEvent) {
        match event {
            YacEvent::Vote { hash, order } => self.vote(hash, order),
            YacEvent::VoteReceived { from, vote } => self.on_vote(from, vote),
            YacEvent::CommitReceived { from, commit } => self.on_commit(from, commit),
            YacEvent::RejectReceived { from, reject } => self.on_reject(from, reject),
            YacEvent::VotingStep { hash, epoch } => self.voting_step(hash, epoch),
            YacEvent::Shutdown => self.clear_round_storage(),
        }
    }

    // ==================== Accessors ====================

    /// Current lifecycle state
    pub fn state(&self) -> YacState {
        self.state
    }

    /// Round of the last vote or adopted outcome
    pub fn current_round(&self) -> Option<Round> {
        self.current_round
    }

    /// Ordering in effect
    pub fn ordering(&self) -> &ClusterOrdering {
        &self.cluster_order
    }

    /// Votes collected in the active round, zero when no round is active
    pub fn round_votes(&self) -> usize {
        self.round.as_ref().map_or(0, |r| r.votes.voted_count())
    }

    /// Timer epoch; bumped whenever round storage is cleared
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ==================== Hash gate ====================

    /// Start a round: sign `hash`, record the own vote, broadcast it and arm
    /// the retransmission timer. A round that already resolved is not
    /// voted on again.
    pub fn vote(&mut self, hash: YacHash, order: ClusterOrdering) {
        if let Some(resolved) = self.resolved_round() {
            if hash.round <= resolved {
                debug!(%hash, resolved, "Round already resolved, vote skipped");
                return;
            }
        }
        self.clear_round_storage();
        self.cluster_order = order;
        self.current_round = Some(hash.round);

        let own_vote = match self.crypto.sign(&hash) {
            Ok(vote) => vote,
            Err(e) => {
                error!(%hash, error = %e, "Failed to sign own vote");
                self.state = YacState::Idle;
                return;
            }
        };

        let mut votes = VoteRoundState::new();
        votes.register_vote(own_vote.clone());
        let self_id = own_vote.voter();

        info!(
            %hash,
            peers = self.cluster_order.size(),
            supermajority = self.cluster_order.supermajority(),
            "Voting"
        );

        for peer in self.cluster_order.peers().iter().filter(|p| p.id != self_id) {
            self.network.send_vote(peer, own_vote.clone());
        }

        self.round = Some(RoundContext {
            hash,
            own_vote,
            votes,
        });
        self.state = YacState::Voting;
        self.arm_timer(hash);

        // A cluster of one is decided by the own vote.
        self.check_outcome();
    }

    // ==================== Network notifications ====================

    /// Apply a vote delivered by the network
    pub fn on_vote(&mut self, from: Peer, vote: VoteMessage) {
        if self.state != YacState::Voting {
            debug!(from = %from, state = ?self.state, "Vote ignored, no round in progress");
            return;
        }
        if let Err(e) = self.verify_vote(&from, &vote) {
            debug!(from = %from, voter = %vote.peer, error = %e, "Vote discarded");
            return;
        }
        if !self.crypto.verify_vote(&vote) {
            warn!(from = %from, voter = %vote.peer, "Vote signature rejected");
            return;
        }

        let Some(round) = self.round.as_mut() else {
            return;
        };
        match round.votes.register_vote(vote) {
            RegisterOutcome::Accepted => {
                debug!(
                    from = %from,
                    votes = round.votes.voted_count(),
                    "Vote accepted"
                );
                self.check_outcome();
            }
            outcome => debug!(from = %from, ?outcome, "Vote not registered"),
        }
    }

    /// Apply a commit delivered by the network.
    ///
    /// After a round resolves only commits for later rounds are applied, so a
    /// peer that has fallen behind still learns the next outcome.
    pub fn on_commit(&mut self, from: Peer, commit: CommitMessage) {
        if let Some(resolved) = self.resolved_round() {
            match commit.hash() {
                Some(hash) if hash.round > resolved => {}
                Some(hash) if self.state == YacState::Committed(*hash) => {
                    debug!(from = %from, "Duplicate commit ignored");
                    return;
                }
                Some(hash) if hash.round == resolved => {
                    warn!(from = %from, %hash, state = ?self.state, "Commit for resolved round ignored");
                    return;
                }
                _ => {
                    debug!(from = %from, resolved, "Stale commit ignored");
                    return;
                }
            }
        }

        match self.verify_commit(&commit) {
            Ok(hash) => {
                info!(from = %from, %hash, votes = commit.votes.len(), "Commit received");
                self.finish_committed(hash);
            }
            Err(e) => warn!(from = %from, error = %e, "Commit discarded"),
        }
    }

    /// Apply a reject delivered by the network
    pub fn on_reject(&mut self, from: Peer, reject: RejectMessage) {
        if let Some(resolved) = self.resolved_round() {
            if reject.round().map_or(true, |round| round <= resolved) {
                debug!(from = %from, state = ?self.state, "Reject ignored, round resolved");
                return;
            }
        }

        match self.verify_reject(&reject) {
            Ok(round) => {
                info!(from = %from, round, votes = reject.votes.len(), "Reject received");
                self.finish_rejected(round);
            }
            Err(e) => warn!(from = %from, error = %e, "Reject discarded"),
        }
    }

    // ==================== Retransmission ====================

    /// Timer callback: resend the own vote to the next peers of the ordering
    /// (round-robin, `retry_fanout` per step) and re-arm.
    pub fn voting_step(&mut self, hash: YacHash, epoch: u64) {
        if epoch != self.epoch || self.state != YacState::Voting {
            debug!(%hash, epoch, current = self.epoch, "Stale voting step ignored");
            return;
        }
        let Some(round) = self.round.as_ref() else {
            return;
        };
        if round.hash != hash {
            debug!(%hash, "Voting step for another hash ignored");
            return;
        }

        self.timer_handle = None;
        let own_vote = round.own_vote.clone();
        let self_id = own_vote.voter();
        let others = self
            .cluster_order
            .peers()
            .iter()
            .filter(|p| p.id != self_id)
            .count();
        let fanout = self.config.retry_fanout.min(others);

        let mut targets = Vec::with_capacity(fanout);
        while targets.len() < fanout {
            let peer = self.cluster_order.current().clone();
            self.cluster_order.advance();
            if peer.id != self_id {
                targets.push(peer);
            }
        }

        debug!(
            %hash,
            targets = ?targets.iter().map(|p| p.id).collect::<Vec<_>>(),
            cursor = self.cluster_order.cursor(),
            "Retransmitting vote"
        );
        for peer in &targets {
            self.network.send_vote(peer, own_vote.clone());
        }

        self.arm_timer(hash);
    }

    // ==================== Checking of input ====================

    /// Membership, round and single-vote checks. The signature is checked
    /// separately so that noise never reaches the crypto provider.
    fn verify_vote(&self, from: &Peer, vote: &VoteMessage) -> ConsensusResult<()> {
        let round = self
            .round
            .as_ref()
            .ok_or_else(|| ConsensusError::Internal("no active round".into()))?;

        if vote.hash.round != round.hash.round {
            return Err(ConsensusError::WrongRound {
                expected: round.hash.round,
                got: vote.hash.round,
            });
        }
        let voter = vote.voter();
        if !self.cluster_order.contains(&voter) {
            return Err(ConsensusError::UnknownPeer(voter));
        }
        if round.votes.has_voted(&voter) {
            return Err(ConsensusError::DuplicatePeer(voter));
        }
        if from.id != voter {
            debug!(from = %from, voter = %voter, "Relayed vote");
        }
        Ok(())
    }

    fn verify_commit(&self, commit: &CommitMessage) -> ConsensusResult<YacHash> {
        let threshold = self.cluster_order.supermajority();
        let hash = *commit.hash().ok_or(ConsensusError::InsufficientVotes {
            required: threshold,
            got: 0,
        })?;

        self.check_round(hash.round)?;
        if commit.votes.iter().any(|v| v.hash != hash) {
            return Err(ConsensusError::MixedHashes);
        }
        self.check_voters(&commit.votes)?;
        if commit.votes.len() < threshold {
            return Err(ConsensusError::InsufficientVotes {
                required: threshold,
                got: commit.votes.len(),
            });
        }
        if !self.crypto.verify_commit(commit) {
            return Err(ConsensusError::InvalidSignature("commit".into()));
        }
        Ok(hash)
    }

    fn verify_reject(&self, reject: &RejectMessage) -> ConsensusResult<Round> {
        let round = reject.round().ok_or(ConsensusError::NotRejectable)?;
        self.check_round(round)?;
        if let Some(vote) = reject.votes.iter().find(|v| v.hash.round != round) {
            return Err(ConsensusError::WrongRound {
                expected: round,
                got: vote.hash.round,
            });
        }
        self.check_voters(&reject.votes)?;

        let mut proof = VoteRoundState::new();
        for vote in &reject.votes {
            proof.register_vote(vote.clone());
        }
        if proof.hashes().len() < 2 {
            return Err(ConsensusError::NotRejectable);
        }
        let remaining = self.cluster_order.size().saturating_sub(proof.voted_count());
        if !proof.is_rejectable(self.cluster_order.supermajority(), remaining) {
            return Err(ConsensusError::NotRejectable);
        }
        if !self.crypto.verify_reject(reject) {
            return Err(ConsensusError::InvalidSignature("reject".into()));
        }
        Ok(round)
    }

    /// Aggregates must name the active round or a later one; an idle engine
    /// adopts any.
    fn check_round(&self, round: Round) -> ConsensusResult<()> {
        match self.current_round {
            Some(expected) if self.state != YacState::Idle && round < expected => {
                Err(ConsensusError::WrongRound {
                    expected,
                    got: round,
                })
            }
            _ => Ok(()),
        }
    }

    /// Distinct members only
    fn check_voters(&self, votes: &[VoteMessage]) -> ConsensusResult<()> {
        let mut seen: HashSet<Address> = HashSet::with_capacity(votes.len());
        for vote in votes {
            let voter = vote.voter();
            if !self.cluster_order.contains(&voter) {
                return Err(ConsensusError::UnknownPeer(voter));
            }
            if !seen.insert(voter) {
                return Err(ConsensusError::DuplicatePeer(voter));
            }
        }
        Ok(())
    }

    // ==================== Outcome detection and propagation ====================

    fn check_outcome(&mut self) {
        let threshold = self.cluster_order.supermajority();
        let size = self.cluster_order.size();
        let Some(round) = self.round.as_mut() else {
            return;
        };

        if let Some(hash) = round.votes.supermajority_hash(threshold) {
            let votes = round.votes.votes_for(&hash).to_vec();
            round.votes.resolve();
            let commit = self.crypto.build_commit(votes);
            self.propagate_commit(hash, commit);
            return;
        }

        let remaining = size.saturating_sub(round.votes.voted_count());
        if round.votes.is_rejectable(threshold, remaining) {
            let hash = round.hash;
            let votes = round.votes.all_votes();
            round.votes.resolve();
            let reject = self.crypto.build_reject(votes);
            self.propagate_reject(hash.round, reject);
        }
    }

    fn propagate_commit(&mut self, hash: YacHash, commit: CommitMessage) {
        info!(%hash, votes = commit.votes.len(), "Supermajority reached, committing");
        for peer in self.peers_except_self() {
            self.network.send_commit(&peer, commit.clone());
        }
        self.finish_committed(hash);
    }

    fn propagate_reject(&mut self, round: Round, reject: RejectMessage) {
        info!(round, votes = reject.votes.len(), "No hash can reach supermajority, rejecting");
        for peer in self.peers_except_self() {
            self.network.send_reject(&peer, reject.clone());
        }
        self.finish_rejected(round);
    }

    /// Round of the terminal state, if any
    fn resolved_round(&self) -> Option<Round> {
        match self.state {
            YacState::Committed(hash) => Some(hash.round),
            YacState::Rejected(round) => Some(round),
            YacState::Idle | YacState::Voting => None,
        }
    }

    fn peers_except_self(&self) -> Vec<Peer> {
        let self_id = self.round.as_ref().map(|r| r.own_vote.voter());
        self.cluster_order
            .peers()
            .iter()
            .filter(|p| Some(p.id) != self_id)
            .cloned()
            .collect()
    }

    fn finish_committed(&mut self, hash: YacHash) {
        self.state = YacState::Committed(hash);
        self.current_round = Some(hash.round);
        self.clear_round_storage();
        // Err only means nobody is subscribed.
        if self.notifier.send(hash).is_err() {
            debug!(%hash, "Commit published with no subscribers");
        }
    }

    fn finish_rejected(&mut self, round: Round) {
        self.state = YacState::Rejected(round);
        self.current_round = Some(round);
        self.clear_round_storage();
    }

    // ==================== Round lifecycle ====================

    fn arm_timer(&mut self, hash: YacHash) {
        let events = self.events.clone();
        let epoch = self.epoch;
        let handle = self.timer.schedule(
            self.config.delay,
            Box::new(move || {
                // The engine may already be gone at shutdown.
                let _ = events.send(YacEvent::VotingStep { hash, epoch });
            }),
        );
        self.timer_handle = Some(handle);
    }

    /// Drop the round's votes, cancel the retransmission timer and move to a
    /// new epoch so a callback already in flight is ignored.
    fn clear_round_storage(&mut self) {
        if let Some(handle) = self.timer_handle.take() {
            self.timer.cancel(handle);
        }
        self.round = None;
        self.epoch += 1;
    }
}
