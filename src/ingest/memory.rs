//! In-process queue: a publisher and queue backend over one shared log.
//! Deliveries hand out in publish order; commits land in a ledger the owner
//! can inspect. There is no reclaim window here, each entry delivers once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::emit::Publisher;
use crate::errors::PumpError;
use crate::ingest::{Delivery, QueueBackend};
use crate::message::AckToken;
use crate::transform::encode::encode_envelope;

#[derive(Clone)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    poll_wait: Duration,
    max_records: usize,
}

#[derive(Default)]
struct Inner {
    entries: Vec<(String, Bytes)>,
    cursor: usize,
    acked: Vec<AckToken>,
    next_seq: u64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            poll_wait: Duration::from_millis(50),
            max_records: 16,
        }
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait = wait;
        self
    }

    pub fn with_max_records(mut self, count: usize) -> Self {
        self.max_records = count.max(1);
        self
    }

    /// Enqueue a payload without an envelope; returns the assigned id.
    pub async fn push_raw(&self, payload: &[u8]) -> String {
        let mut inner = self.inner.lock().await;
        inner.next_seq += 1;
        let id = format!("m-{}", inner.next_seq);
        inner
            .entries
            .push((id.clone(), Bytes::copy_from_slice(payload)));
        id
    }

    /// Tokens committed so far, in commit order.
    pub async fn acked(&self) -> Vec<AckToken> {
        self.inner.lock().await.acked.clone()
    }

    /// Entries published but not yet handed out.
    pub async fn depth(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.entries.len() - inner.cursor
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MemoryQueue {
    async fn publish(&self, subject: &str, body: &str) -> Result<String, PumpError> {
        let payload = encode_envelope(subject, body)?;
        Ok(self.push_raw(payload.as_bytes()).await)
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    type Error = PumpError;

    async fn poll(&self) -> Result<Vec<Delivery>, PumpError> {
        let deadline = Instant::now() + self.poll_wait;
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.cursor < inner.entries.len() {
                    let end = (inner.cursor + self.max_records).min(inner.entries.len());
                    let out = inner.entries[inner.cursor..end]
                        .iter()
                        .map(|(id, payload)| Delivery {
                            id: id.clone(),
                            payload: payload.clone(),
                        })
                        .collect();
                    inner.cursor = end;
                    return Ok(out);
                }
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn commit(&self, tokens: &[AckToken]) -> Result<(), PumpError> {
        if tokens.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        inner.acked.extend(tokens.iter().cloned());
        Ok(())
    }
}
