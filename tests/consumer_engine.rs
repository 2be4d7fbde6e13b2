//! Scenario tests for the polling consumer engine, driven through scripted
//! fakes: partial-failure partitioning, commit granularity per policy,
//! lifecycle idempotence, and loop resilience.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;

use message_pump::ack::AckPolicy;
use message_pump::consumer::PollingConsumer;
use message_pump::emit::dlq::FailureRouter;
use message_pump::emit::Publisher;
use message_pump::errors::PumpError;
use message_pump::ingest::memory::MemoryQueue;
use message_pump::ingest::{Delivery, QueueBackend};
use message_pump::message::{AckToken, Message};
use message_pump::process::builtin::{LogProcessor, PoisonPillProcessor};

/// ---- Fakes -----

#[derive(Clone, Default)]
struct ScriptedBackend {
    script: Arc<Mutex<VecDeque<Result<Vec<Delivery>, PumpError>>>>,
    commits: Arc<Mutex<Vec<Vec<AckToken>>>>,
    fail_commits: Arc<AtomicBool>,
}

impl ScriptedBackend {
    fn push_batch(&self, items: &[(&str, &str)]) {
        let batch = items
            .iter()
            .map(|(id, body)| Delivery {
                id: id.to_string(),
                payload: Bytes::copy_from_slice(body.as_bytes()),
            })
            .collect();
        self.script.lock().unwrap().push_back(Ok(batch));
    }

    fn push_poll_error(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(PumpError::Backend("scripted poll failure".into())));
    }

    fn commits(&self) -> Vec<Vec<AckToken>> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueBackend for ScriptedBackend {
    type Error = PumpError;

    async fn poll(&self) -> Result<Vec<Delivery>, PumpError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                // Drained scripts behave like an idle source.
                sleep(Duration::from_millis(5)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn commit(&self, tokens: &[AckToken]) -> Result<(), PumpError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(PumpError::Commit("scripted commit failure".into()));
        }
        self.commits.lock().unwrap().push(tokens.to_vec());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CountingRouter {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl FailureRouter for CountingRouter {
    async fn handle_failure(&self, message: &Message) -> Result<(), PumpError> {
        self.seen.lock().unwrap().push(message.id().to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct BrokenRouter {
    calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl FailureRouter for BrokenRouter {
    async fn handle_failure(&self, _message: &Message) -> Result<(), PumpError> {
        *self.calls.lock().unwrap() += 1;
        Err(PumpError::Publish("router unavailable".into()))
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// ---- Tests ----

#[tokio::test]
async fn partial_failure_commits_only_successes() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("r-1", "ok"), ("r-2", "fail me"), ("r-3", "ok")]);
    let router = CountingRouter::default();
    let router_seen = router.seen.clone();

    let mut consumer =
        PollingConsumer::new(backend.clone(), PoisonPillProcessor::with_marker("fail"))
            .with_policy(AckPolicy::EveryBatch)
            .with_router(router);
    assert!(consumer.start());

    let commits = backend.commits.clone();
    wait_until(move || !commits.lock().unwrap().is_empty()).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    // One commit per cycle, successes only, input order preserved.
    assert_eq!(backend.commits(), vec![vec!["r-1".to_string(), "r-3".to_string()]]);
    assert_eq!(router_seen.lock().unwrap().as_slice(), ["r-2".to_string()]);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.commits, 1);
}

#[tokio::test]
async fn zero_successes_issue_no_commit() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("r-1", "fail a"), ("r-2", "fail b")]);
    let router = CountingRouter::default();
    let router_seen = router.seen.clone();

    let mut consumer =
        PollingConsumer::new(backend.clone(), PoisonPillProcessor::with_marker("fail"))
            .with_policy(AckPolicy::EveryBatch)
            .with_router(router);
    assert!(consumer.start());

    wait_until(move || router_seen.lock().unwrap().len() == 2).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert!(backend.commits().is_empty());
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.failed, 2);
}

#[tokio::test]
async fn every_message_commits_each_success_alone() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("r-1", "ok"), ("r-2", "ok")]);

    let mut consumer = PollingConsumer::new(backend.clone(), LogProcessor)
        .with_policy(AckPolicy::EveryMessage);
    assert!(consumer.start());

    let commits = backend.commits.clone();
    wait_until(move || commits.lock().unwrap().len() == 2).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert_eq!(
        backend.commits(),
        vec![vec!["r-1".to_string()], vec!["r-2".to_string()]]
    );
    assert_eq!(stats.commits, 2);
}

#[tokio::test]
async fn periodic_still_commits_receipts_each_cycle() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("p-1", "ok"), ("p-2", "ok")]);
    backend.push_batch(&[("p-3", "ok")]);

    // An hour-long interval: only the progress marker waits on it, receipt
    // releases never do.
    let mut consumer = PollingConsumer::new(backend.clone(), LogProcessor)
        .with_policy(AckPolicy::Periodic(Duration::from_secs(3600)));
    assert!(consumer.start());

    let commits = backend.commits.clone();
    wait_until(move || commits.lock().unwrap().len() == 2).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert_eq!(
        backend.commits(),
        vec![
            vec!["p-1".to_string(), "p-2".to_string()],
            vec!["p-3".to_string()]
        ]
    );
    assert_eq!(stats.commits, 2);
    assert_eq!(stats.processed, 3);
}

#[tokio::test]
async fn second_start_is_refused_while_running() {
    let backend = ScriptedBackend::default();
    let mut consumer = PollingConsumer::new(backend, LogProcessor);

    assert!(consumer.start());
    assert!(consumer.is_running());
    assert!(!consumer.start());

    consumer.stop();
    consumer.join().await.expect("worker stats");
    assert!(!consumer.is_running());
}

#[tokio::test]
async fn restart_after_stop_spawns_a_fresh_worker() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("a-1", "ok")]);

    let mut consumer = PollingConsumer::new(backend.clone(), LogProcessor)
        .with_policy(AckPolicy::EveryBatch);
    assert!(consumer.start());
    let commits = backend.commits.clone();
    wait_until(move || commits.lock().unwrap().len() == 1).await;
    consumer.stop();
    let first = consumer.join().await.expect("first run stats");
    assert_eq!(first.cycles, 1);

    // A fresh worker picks up new work and never re-acknowledges old work.
    backend.push_batch(&[("b-1", "ok")]);
    assert!(consumer.start());
    let commits = backend.commits.clone();
    wait_until(move || commits.lock().unwrap().len() == 2).await;
    consumer.stop();
    let second = consumer.join().await.expect("second run stats");

    assert_eq!(second.cycles, 1);
    assert_eq!(
        backend.commits(),
        vec![vec!["a-1".to_string()], vec!["b-1".to_string()]]
    );
}

#[tokio::test]
async fn commit_failure_is_swallowed_and_loop_continues() {
    let backend = ScriptedBackend::default();
    backend.fail_commits.store(true, Ordering::SeqCst);
    backend.push_batch(&[("r-1", "ok")]);
    backend.push_batch(&[("r-2", "ok")]);

    let mut consumer = PollingConsumer::new(backend.clone(), LogProcessor)
        .with_policy(AckPolicy::EveryBatch);
    assert!(consumer.start());

    let script = backend.script.clone();
    wait_until(move || script.lock().unwrap().is_empty()).await;
    // Give the second cycle time to finish before stopping.
    sleep(Duration::from_millis(20)).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert_eq!(stats.cycles, 2);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.commits, 0);
    assert!(backend.commits().is_empty());
}

#[tokio::test]
async fn poll_error_keeps_the_loop_alive() {
    let backend = ScriptedBackend::default();
    backend.push_poll_error();
    backend.push_batch(&[("r-1", "ok")]);

    let mut consumer = PollingConsumer::new(backend.clone(), LogProcessor)
        .with_policy(AckPolicy::EveryBatch);
    assert!(consumer.start());

    let commits = backend.commits.clone();
    wait_until(move || !commits.lock().unwrap().is_empty()).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert_eq!(stats.poll_errors, 1);
    assert_eq!(backend.commits(), vec![vec!["r-1".to_string()]]);
}

#[tokio::test]
async fn router_errors_are_swallowed() {
    let backend = ScriptedBackend::default();
    backend.push_batch(&[("r-1", "fail one"), ("r-2", "ok")]);
    let router = BrokenRouter::default();
    let calls = router.calls.clone();

    let mut consumer =
        PollingConsumer::new(backend.clone(), PoisonPillProcessor::with_marker("fail"))
            .with_policy(AckPolicy::EveryBatch)
            .with_router(router);
    assert!(consumer.start());

    let commits = backend.commits.clone();
    wait_until(move || !commits.lock().unwrap().is_empty()).await;
    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(backend.commits(), vec![vec!["r-2".to_string()]]);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn memory_queue_end_to_end() {
    let queue = MemoryQueue::new()
        .with_poll_wait(Duration::from_millis(10))
        .with_max_records(8);
    queue.publish("Orders", "order 1").await.unwrap();
    queue.publish("Orders", "order 2").await.unwrap();
    let raw_id = queue.push_raw(b"plain payload").await;

    let mut consumer = PollingConsumer::new(queue.clone(), LogProcessor)
        .with_policy(AckPolicy::EveryBatch);
    assert!(consumer.start());

    let watcher = queue.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.acked().await.len() < 3 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("messages were not acknowledged in time");

    consumer.stop();
    let stats = consumer.join().await.expect("worker stats");

    let acked = queue.acked().await;
    assert_eq!(acked.len(), 3);
    assert!(acked.contains(&raw_id));
    assert_eq!(stats.failed, 0);
    assert_eq!(queue.depth().await, 0);
}
