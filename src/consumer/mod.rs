//! Polling consumer engine
//!
//! Overview
//! --------
//! Drives a queue-style backend: poll a batch, decode each delivery, hand
//! it to the processor, route failures, and commit confirmed work according
//! to the acknowledgment policy. Per-message failures never terminate the
//! loop; they cost only the affected delivery a redelivery round.
//!
//! Lifecycle
//! ---------
//! - `start` flips the running flag with a single compare-and-set and
//!   spawns exactly one worker; a second call is refused while one lives.
//! - `stop` signals the worker between cycles. A cycle already underway
//!   runs to completion, so acknowledgments are never torn.
//! - `join` waits for the worker and returns its counters.
//!
//! Error Model
//! -----------
//! - Poll and commit failures are logged and counted; the loop continues.
//! - Failure-router errors are logged and swallowed.
//! - Only construction and name resolution abort startup.

pub mod stream;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ack::{AckPolicy, AckTracker};
use crate::emit::dlq::FailureRouter;
use crate::errors::PumpError;
use crate::ingest::{Delivery, QueueBackend};
use crate::message::AckToken;
use crate::process::Processor;
use crate::transform::decode::decode_delivery;

/// Counters a worker reports when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub cycles: u64,
    pub processed: u64,
    pub failed: u64,
    pub commits: u64,
    pub poll_errors: u64,
}

pub struct PollingConsumer<B, P>
where
    B: QueueBackend<Error = PumpError> + Send + Sync + 'static,
    P: Processor + 'static,
{
    backend: Arc<B>,
    processor: Arc<P>,
    router: Option<Arc<dyn FailureRouter>>,
    policy: AckPolicy,
    running: Arc<AtomicBool>,
    stop_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<ConsumerStats>>,
}

impl<B, P> PollingConsumer<B, P>
where
    B: QueueBackend<Error = PumpError> + Send + Sync + 'static,
    P: Processor + 'static,
{
    pub fn new(backend: B, processor: P) -> Self {
        Self {
            backend: Arc::new(backend),
            processor: Arc::new(processor),
            router: None,
            policy: AckPolicy::EveryBatch,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn with_policy(mut self, policy: AckPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_router<R: FailureRouter + 'static>(mut self, router: R) -> Self {
        self.router = Some(Arc::new(router));
        self
    }

    /// Spawn the worker. Returns false without side effects when a worker
    /// is already running (or still draining after `stop`).
    pub fn start(&mut self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("consumer already running; start ignored");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = Worker {
            backend: Arc::clone(&self.backend),
            processor: Arc::clone(&self.processor),
            router: self.router.clone(),
            policy: self.policy,
            running: Arc::clone(&self.running),
        };
        self.stop_tx = Some(stop_tx);
        self.handle = Some(tokio::spawn(worker.run(stop_rx)));
        true
    }

    /// Ask the worker to stop after the cycle in progress. No-op when
    /// nothing is running.
    pub fn stop(&self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }

    /// Wait for the worker to exit and collect its counters.
    pub async fn join(&mut self) -> Option<ConsumerStats> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(err = %e, "consumer worker panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct Worker<B, P> {
    backend: Arc<B>,
    processor: Arc<P>,
    router: Option<Arc<dyn FailureRouter>>,
    policy: AckPolicy,
    running: Arc<AtomicBool>,
}

impl<B, P> Worker<B, P>
where
    B: QueueBackend<Error = PumpError> + Send + Sync,
    P: Processor,
{
    async fn run(self, mut stop_rx: watch::Receiver<bool>) -> ConsumerStats {
        info!(policy = ?self.policy, "consumer started");
        let mut stats = ConsumerStats::default();
        let mut tracker = AckTracker::new(self.policy);

        loop {
            // The stop signal can only interrupt the wait for a batch,
            // never a cycle in progress.
            let batch = tokio::select! {
                _ = stop_rx.changed() => break,
                polled = self.backend.poll() => match polled {
                    Ok(b) => b,
                    Err(e) => {
                        stats.poll_errors += 1;
                        error!(err = %e, "poll failed");
                        continue;
                    }
                },
            };

            if batch.is_empty() {
                continue;
            }
            stats.cycles += 1;
            self.run_cycle(batch, &mut tracker, &mut stats).await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            cycles = stats.cycles,
            processed = stats.processed,
            failed = stats.failed,
            "consumer stopped"
        );
        stats
    }

    async fn run_cycle(
        &self,
        batch: Vec<Delivery>,
        tracker: &mut AckTracker,
        stats: &mut ConsumerStats,
    ) {
        let mut successes: Vec<AckToken> = Vec::new();

        for delivery in batch {
            let message = decode_delivery(&delivery);
            match self.processor.process(&message).await {
                Ok(token) => {
                    stats.processed += 1;
                    if matches!(self.policy, AckPolicy::EveryMessage) {
                        self.commit(std::slice::from_ref(&token), stats).await;
                    } else {
                        successes.push(token);
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(id = %message.id(), err = %e, "processing failed");
                    if let Some(router) = &self.router {
                        if let Err(re) = router.handle_failure(&message).await {
                            error!(id = %message.id(), err = %re, "failure routing failed");
                        }
                    }
                }
            }
        }

        // Receipt-based backends never defer the actual release; a periodic
        // policy only spaces out the progress marker.
        if !successes.is_empty() {
            self.commit(&successes, stats).await;
        }
        if matches!(self.policy, AckPolicy::Periodic(_)) {
            let now = Instant::now();
            if tracker.due(now) {
                tracker.mark_committed(now);
                info!(processed = stats.processed, "progress checkpoint");
            }
        }
    }

    async fn commit(&self, tokens: &[AckToken], stats: &mut ConsumerStats) {
        if tokens.is_empty() {
            return;
        }
        match self.backend.commit(tokens).await {
            Ok(()) => stats.commits += 1,
            Err(e) => error!(count = tokens.len(), err = %e, "commit failed"),
        }
    }
}
