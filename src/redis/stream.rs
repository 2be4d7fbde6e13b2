//! Stream-style source: plain XREAD from a stored position.
//!
//! Overview
//! --------
//! One logical shard per stream key. Progress lives under a per-application
//! checkpoint key next to the stream; `init` loads it, `next_batch` reads
//! past the cursor, and `checkpoint` writes the given or last delivered id.
//! Everything before the checkpoint is considered consumed on restart.

use crate::errors::PumpError;
use crate::ingest::{Delivery, StreamBackend};
use crate::redis::{parse_xread_value, resolve_stream_key};
use deadpool_redis::redis::{self};
use deadpool_redis::Pool;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

const START_POSITION: &str = "0-0";

pub struct RedisCheckpointedStream {
    pool: Pool,
    stream: String,
    checkpoint_key: String,
    poll_wait_ms: usize,
    max_records: usize,
    state: Mutex<CursorState>,
}

struct CursorState {
    next: String,
    last_delivered: Option<String>,
}

impl RedisCheckpointedStream {
    /// Resolve the stream by suffix; `app` namespaces the checkpoint so
    /// independent applications can trail the same stream.
    pub async fn resolve(pool: Pool, name: &str, app: &str) -> Result<Self, PumpError> {
        let stream = resolve_stream_key(&pool, name).await?;
        let checkpoint_key = format!("{stream}:checkpoint:{app}");
        Ok(Self {
            pool,
            stream,
            checkpoint_key,
            poll_wait_ms: 8_000,
            max_records: 1,
            state: Mutex::new(CursorState {
                next: START_POSITION.to_string(),
                last_delivered: None,
            }),
        })
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait_ms = wait.as_millis() as usize;
        self
    }

    pub fn with_max_records(mut self, count: usize) -> Self {
        self.max_records = count.max(1);
        self
    }
}

#[async_trait::async_trait]
impl StreamBackend for RedisCheckpointedStream {
    type Error = PumpError;

    fn shard(&self) -> &str {
        &self.stream
    }

    async fn init(&self) -> Result<String, PumpError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;
        let stored: Option<String> = redis::cmd("GET")
            .arg(&self.checkpoint_key)
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Backend(e.to_string()))?;

        let start = stored.unwrap_or_else(|| START_POSITION.to_string());
        let mut state = self.state.lock().await;
        state.next = start.clone();
        state.last_delivered = None;
        Ok(start)
    }

    async fn next_batch(&self) -> Result<Vec<Delivery>, PumpError> {
        let from = self.state.lock().await.next.clone();
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;

        let val: redis::Value = redis::cmd("XREAD")
            .arg("COUNT")
            .arg(self.max_records)
            .arg("BLOCK")
            .arg(self.poll_wait_ms)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(&from)
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Backend(e.to_string()))?;

        let batch = parse_xread_value(val);
        if let Some(last) = batch.last() {
            let mut state = self.state.lock().await;
            state.next = last.id.clone();
            state.last_delivered = Some(last.id.clone());
        }
        Ok(batch)
    }

    async fn checkpoint(&self, position: Option<&str>) -> Result<(), PumpError> {
        let position = match position {
            Some(p) => p.to_string(),
            None => match self.state.lock().await.last_delivered.clone() {
                Some(p) => p,
                // Nothing delivered yet; there is no progress to record.
                None => return Ok(()),
            },
        };

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;
        redis::cmd("SET")
            .arg(&self.checkpoint_key)
            .arg(&position)
            .query_async::<_, String>(&mut *conn)
            .await
            .map_err(map_checkpoint_err)?;

        debug!(key = %self.checkpoint_key, position = %position, "checkpoint saved");
        Ok(())
    }
}

/// Server-busy replies are retryable; the engine keeps the checkpoint for
/// the next attempt instead of treating them as losses.
fn map_checkpoint_err(e: redis::RedisError) -> PumpError {
    let text = e.to_string();
    if text.contains("BUSY") || text.contains("LOADING") || text.contains("TRYAGAIN") {
        PumpError::Throttled(text)
    } else {
        PumpError::Commit(text)
    }
}
