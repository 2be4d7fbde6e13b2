//! Acknowledgment policies and the timing state behind them.
//!
//! `AckTracker` never reads the clock itself; callers pass `Instant`s in, so
//! engines decide when "now" is sampled and tests can drive time directly.

use std::time::{Duration, Instant};

/// When confirmed work is committed back to the source.
///
/// - `EveryMessage`: commit each success as soon as the processor returns.
/// - `EveryBatch`: commit all of a cycle's successes once, at cycle end.
/// - `Periodic`: commit when more than the interval has passed since the
///   last commit. Queue-style backends still release receipts per cycle;
///   only progress marking is deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    EveryMessage,
    EveryBatch,
    Periodic(Duration),
}

#[derive(Debug, Clone)]
pub struct AckTracker {
    policy: AckPolicy,
    last_commit: Instant,
}

impl AckTracker {
    pub fn new(policy: AckPolicy) -> Self {
        Self::with_origin(policy, Instant::now())
    }

    /// Start the interval clock at `origin` instead of now.
    pub fn with_origin(policy: AckPolicy, origin: Instant) -> Self {
        Self {
            policy,
            last_commit: origin,
        }
    }

    pub fn policy(&self) -> AckPolicy {
        self.policy
    }

    /// Whether a deferred commit is owed at `now`. `Periodic` fires strictly
    /// after the interval; at exactly the interval it does not.
    pub fn due(&self, now: Instant) -> bool {
        match self.policy {
            AckPolicy::EveryMessage => false,
            AckPolicy::EveryBatch => true,
            AckPolicy::Periodic(interval) => now.duration_since(self.last_commit) > interval,
        }
    }

    pub fn mark_committed(&mut self, now: Instant) {
        self.last_commit = now;
    }
}
