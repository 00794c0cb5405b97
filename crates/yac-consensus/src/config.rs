//! Engine configuration

use std::time::Duration;

/// YAC engine configuration
#[derive(Debug, Clone)]
pub struct YacConfig {
    /// Delay between vote retransmission steps
    pub delay: Duration,
    /// Peers contacted per retransmission step
    pub retry_fanout: usize,
    /// Buffered commit notifications per subscriber
    pub commit_channel_capacity: usize,
}

impl Default for YacConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1000),
            retry_fanout: 1,
            commit_channel_capacity: 64,
        }
    }
}

impl YacConfig {
    /// Config with the given retransmission delay
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// Copy with zero values lifted to their minimum of one
    pub fn normalized(mut self) -> Self {
        self.retry_fanout = self.retry_fanout.max(1);
        self.commit_channel_capacity = self.commit_channel_capacity.max(1);
        self
    }
}
