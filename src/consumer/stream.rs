//! Stream consumer: the same lifecycle as the polling engine over a
//! checkpointed source. Confirmed progress is a position, not a receipt,
//! so the policy decides when the position is persisted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::ack::{AckPolicy, AckTracker};
use crate::consumer::ConsumerStats;
use crate::emit::dlq::FailureRouter;
use crate::errors::PumpError;
use crate::ingest::{Delivery, StreamBackend};
use crate::process::Processor;
use crate::transform::decode::decode_delivery;

/// Batch-processing core, separate from the task lifecycle so tests can
/// drive it with explicit clocks and fake backends.
pub struct RecordPump<P> {
    processor: Arc<P>,
    router: Option<Arc<dyn FailureRouter>>,
    policy: AckPolicy,
    tracker: AckTracker,
    pending_since_checkpoint: usize,
}

impl<P: Processor> RecordPump<P> {
    pub fn new(processor: Arc<P>, policy: AckPolicy) -> Self {
        Self {
            processor,
            router: None,
            policy,
            tracker: AckTracker::new(policy),
            pending_since_checkpoint: 0,
        }
    }

    pub fn with_router(mut self, router: Arc<dyn FailureRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Start the periodic interval at `origin` instead of now.
    pub fn with_origin(mut self, origin: Instant) -> Self {
        self.tracker = AckTracker::with_origin(self.policy, origin);
        self
    }

    pub async fn process_batch<B>(
        &mut self,
        batch: Vec<Delivery>,
        backend: &B,
        now: Instant,
        stats: &mut ConsumerStats,
    ) where
        B: StreamBackend<Error = PumpError> + Sync,
    {
        let mut any_success = false;

        for delivery in batch {
            let message = decode_delivery(&delivery);
            match self.processor.process(&message).await {
                Ok(token) => {
                    stats.processed += 1;
                    self.pending_since_checkpoint += 1;
                    any_success = true;
                    if matches!(self.policy, AckPolicy::EveryMessage) {
                        self.checkpoint(backend, Some(&token), stats).await;
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

        match self.policy {
            AckPolicy::EveryMessage => {}
            AckPolicy::EveryBatch => {
                if any_success {
                    self.checkpoint(backend, None, stats).await;
                }
            }
            AckPolicy::Periodic(_) => {
                // A checkpoint with nothing processed behind it would only
                // rewrite the same position. The interval restarts on a
                // successful write; a failed one retries on the next batch.
                if self.pending_since_checkpoint > 0 && self.tracker.due(now) {
                    let saved = self.checkpoint(backend, None, stats).await;
                    if saved {
                        self.tracker.mark_committed(now);
                    }
                }
            }
        }
    }

    /// Final checkpoint on the way out. A throttled rejection is retryable
    /// on the next start and not worth more than a log line.
    pub async fn shutdown<B>(&mut self, backend: &B)
    where
        B: StreamBackend<Error = PumpError> + Sync,
    {
        match backend.checkpoint(None).await {
            Ok(()) => info!("final checkpoint saved"),
            Err(PumpError::Throttled(e)) => {
                info!(err = %e, "final checkpoint throttled; position retries on next start")
            }
            Err(e) => warn!(err = %e, "final checkpoint failed"),
        }
    }

    /// Returns whether the write landed. Counters reset only on success.
    async fn checkpoint<B>(
        &mut self,
        backend: &B,
        position: Option<&str>,
        stats: &mut ConsumerStats,
    ) -> bool
    where
        B: StreamBackend<Error = PumpError> + Sync,
    {
        match backend.checkpoint(position).await {
            Ok(()) => {
                stats.commits += 1;
                self.pending_since_checkpoint = 0;
                true
            }
            Err(e) => {
                error!(err = %e, "checkpoint failed");
                false
            }
        }
    }
}

pub struct StreamConsumer<B, P>
where
    B: StreamBackend<Error = PumpError> + Send + Sync + 'static,
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

impl<B, P> StreamConsumer<B, P>
where
    B: StreamBackend<Error = PumpError> + Send + Sync + 'static,
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

    pub fn start(&mut self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("stream consumer already running; start ignored");
            return false;
        }

        let mut pump = RecordPump::new(Arc::clone(&self.processor), self.policy);
        if let Some(router) = &self.router {
            pump = pump.with_router(Arc::clone(router));
        }
        let worker = StreamWorker {
            backend: Arc::clone(&self.backend),
            pump,
            running: Arc::clone(&self.running),
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.handle = Some(tokio::spawn(worker.run(stop_rx)));
        true
    }

    pub fn stop(&self) {
        if let Some(tx) = &self.stop_tx {
            let _ = tx.send(true);
        }
    }

    pub async fn join(&mut self) -> Option<ConsumerStats> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(err = %e, "stream worker panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

struct StreamWorker<B, P> {
    backend: Arc<B>,
    pump: RecordPump<P>,
    running: Arc<AtomicBool>,
}

impl<B, P> StreamWorker<B, P>
where
    B: StreamBackend<Error = PumpError> + Send + Sync,
    P: Processor,
{
    async fn run(mut self, mut stop_rx: watch::Receiver<bool>) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        let position = match self.backend.init().await {
            Ok(p) => p,
            Err(e) => {
                error!(shard = %self.backend.shard(), err = %e, "stream initialization failed");
                self.running.store(false, Ordering::SeqCst);
                return stats;
            }
        };
        info!(shard = %self.backend.shard(), position = %position, "stream consumer resuming");

        loop {
            let batch = tokio::select! {
                _ = stop_rx.changed() => break,
                polled = self.backend.next_batch() => match polled {
                    Ok(b) => b,
                    Err(e) => {
                        stats.poll_errors += 1;
                        error!(shard = %self.backend.shard(), err = %e, "batch read failed");
                        continue;
                    }
                },
            };

            if batch.is_empty() {
                continue;
            }
            stats.cycles += 1;
            self.pump
                .process_batch(batch, self.backend.as_ref(), Instant::now(), &mut stats)
                .await;
        }

        self.pump.shutdown(self.backend.as_ref()).await;
        self.running.store(false, Ordering::SeqCst);
        info!(
            shard = %self.backend.shard(),
            processed = stats.processed,
            failed = stats.failed,
            "stream consumer stopped"
        );
        stats
    }
}
