//! Round driver: votes on one candidate per round and reports outcomes.
//!
//! Rounds are numbered by wall-clock time (`unix_ms / round_interval`), so
//! every node with a roughly synchronised clock votes on the same round at
//! the same moment. The candidate for a round is derived from its number
//! alone, which lets an honest cluster agree.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use yac_consensus::{ClusterOrdering, HashGate, YacHash};
use yac_crypto::{keccak256, keccak256_concat};
use yac_primitives::Round;

/// Round number at `now`
pub fn round_at(now: SystemTime, interval: Duration) -> Round {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    (since_epoch.as_millis() / interval.as_millis().max(1)) as Round
}

/// Time from `now` until the next round starts
pub fn until_next_round(now: SystemTime, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1);
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    let remaining = interval_ms - since_epoch % interval_ms;
    Duration::from_millis(remaining as u64)
}

/// Candidate voted on in `round`
pub fn candidate(round: Round) -> YacHash {
    let round_bytes = round.to_le_bytes();
    YacHash::new(
        round,
        keccak256_concat(&[b"yac-proposal".as_slice(), &round_bytes]),
        keccak256(&round_bytes),
    )
}

/// Totals reported when the driver stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Rounds voted on
    pub rounds: u64,
    /// Commits observed
    pub committed: u64,
}

/// Feeds the engine one candidate per round
pub struct RoundDriver {
    gate: Arc<dyn HashGate>,
    order: ClusterOrdering,
    interval: Duration,
    max_rounds: Option<u64>,
}

impl RoundDriver {
    /// Create a driver
    pub fn new(
        gate: Arc<dyn HashGate>,
        order: ClusterOrdering,
        interval: Duration,
        max_rounds: Option<u64>,
    ) -> Self {
        Self {
            gate,
            order,
            interval,
            max_rounds,
        }
    }

    /// Run until shutdown, or until the last of `max_rounds` has had a full
    /// round to finish
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> DriverStats {
        let mut commits = self.gate.subscribe_commits();
        let mut stats = DriverStats::default();
        let mut last_round: Option<Round> = None;

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            peers = self.order.size(),
            "Round driver starting"
        );

        loop {
            let wait = until_next_round(SystemTime::now(), self.interval);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if self.max_rounds.is_some_and(|max| stats.rounds >= max) {
                        break;
                    }
                    let round = round_at(SystemTime::now(), self.interval);
                    if last_round.is_some_and(|last| round <= last) {
                        continue;
                    }
                    if let Some(last) = last_round {
                        if round > last + 1 {
                            tracing::warn!(skipped = round - last - 1, "Rounds skipped");
                        }
                    }
                    let hash = candidate(round);
                    tracing::debug!(round, %hash, "Proposing");
                    self.gate.vote(hash, self.order.clone());
                    last_round = Some(round);
                    stats.rounds += 1;
                }
                received = commits.recv() => match received {
                    Ok(hash) => {
                        stats.committed += 1;
                        tracing::info!(
                            round = hash.round,
                            block = %hash.block_hash,
                            expected = hash == candidate(hash.round),
                            "Round committed"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Commit subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Commit channel closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Round driver stopping");
                        break;
                    }
                }
            }
        }

        tracing::info!(rounds = stats.rounds, committed = stats.committed, "Round driver stopped");
        stats
    }
}
