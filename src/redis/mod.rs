//! Redis Streams integration (single version of `redis` via deadpool-redis)
//!
//! Overview
//! --------
//! Queue-style consumption on top of consumer groups: XREADGROUP hands out
//! deliveries, XACK releases them, and XAUTOCLAIM sweeps back anything a
//! dead or stalled run left unacknowledged past the reclaim window. Stream
//! names are resolved by suffix against the live keyspace so deployments
//! can prefix keys per environment.

use crate::errors::PumpError;
use crate::ingest::{Delivery, QueueBackend};
use crate::message::AckToken;
use bytes::Bytes;
use deadpool_redis::redis::{self};
use deadpool_redis::{Config, Pool, Runtime};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::debug;

pub mod stream;

static REDIS_POOL: OnceCell<Pool> = OnceCell::new();

pub async fn init_redis_pool(redis_url: &str) -> Result<(), PumpError> {
    let cfg = Config::from_url(redis_url);
    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| PumpError::RedisInit(e.to_string()))?;
    REDIS_POOL
        .set(pool)
        .map_err(|_| PumpError::RedisInit("pool already initialized".into()))?;
    Ok(())
}

pub fn pool() -> &'static Pool {
    REDIS_POOL.get().expect("pool not initialized")
}

/// Resolve the unique stream key whose name ends in `name`. Zero or multiple
/// matches are setup failures; workers fail fast rather than consume from a
/// guessed key.
pub async fn resolve_stream_key(pool: &Pool, name: &str) -> Result<String, PumpError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| PumpError::RedisInit(e.to_string()))?;

    let mut keys: Vec<String> = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(format!("*{name}"))
            .arg("COUNT")
            .arg(100)
            .arg("TYPE")
            .arg("stream")
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Backend(e.to_string()))?;
        keys.extend(batch);
        cursor = next;
        if cursor == 0 {
            break;
        }
    }

    if keys.len() > 1 {
        return Err(PumpError::Resolve(format!(
            "stream name '{name}' is ambiguous: {} keys match",
            keys.len()
        )));
    }
    match keys.pop() {
        Some(key) => Ok(key),
        None => Err(PumpError::Resolve(format!("no stream matching '{name}'"))),
    }
}

#[derive(Clone)]
pub struct RedisStreamQueue {
    pool: Pool,
    stream: String,
    group: String,
    consumer: String,
    poll_wait_ms: usize,
    max_records: usize,
    reclaim_idle_ms: usize,
}

impl RedisStreamQueue {
    /// Attach to an exact stream key. The consumer group is not created
    /// here; call `ensure_stream_group` before polling.
    pub fn new(pool: Pool, stream: &str, group: &str, consumer: &str) -> Self {
        Self {
            pool,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer: consumer.to_string(),
            poll_wait_ms: 8_000,
            max_records: 1,
            reclaim_idle_ms: 30_000,
        }
    }

    /// Resolve the stream by suffix and make sure the consumer group exists.
    pub async fn resolve(
        pool: Pool,
        name: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Self, PumpError> {
        let stream = resolve_stream_key(&pool, name).await?;
        let queue = Self::new(pool, &stream, group, consumer);
        queue.ensure_stream_group().await?;
        Ok(queue)
    }

    pub fn with_poll_wait(mut self, wait: Duration) -> Self {
        self.poll_wait_ms = wait.as_millis() as usize;
        self
    }

    pub fn with_max_records(mut self, count: usize) -> Self {
        self.max_records = count.max(1);
        self
    }

    /// How long a delivery may sit unacknowledged before a poll reclaims it.
    pub fn with_reclaim_idle(mut self, idle: Duration) -> Self {
        self.reclaim_idle_ms = idle.as_millis() as usize;
        self
    }

    pub fn stream_key(&self) -> &str {
        &self.stream
    }

    pub async fn ensure_stream_group(&self) -> Result<(), PumpError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;
        let r: Result<String, _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.stream)
            .arg(&self.group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;

        match r {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(PumpError::Backend(e.to_string())),
        }
    }

    async fn read_new(&self) -> Result<Vec<Delivery>, PumpError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;

        // Ask for a typed Value to avoid cross-crate type mismatch
        let val: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(self.max_records)
            .arg("BLOCK")
            .arg(self.poll_wait_ms)
            .arg("STREAMS")
            .arg(&self.stream)
            .arg(">")
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Backend(e.to_string()))?;

        Ok(parse_xread_value(val))
    }

    /// Claim deliveries some run polled but never acknowledged, once they
    /// have been idle past the reclaim window.
    async fn claim_stalled(&self) -> Result<Vec<Delivery>, PumpError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;

        let val: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.stream)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.reclaim_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(self.max_records)
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Backend(e.to_string()))?;

        Ok(parse_autoclaim_value(val))
    }

    pub async fn ack_many(&self, ids: &[AckToken]) -> Result<(), PumpError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;
        let mut cmd = redis::cmd("XACK");
        cmd.arg(&self.stream).arg(&self.group);
        for id in ids {
            cmd.arg(id);
        }
        let _: i64 = cmd
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Commit(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QueueBackend for RedisStreamQueue {
    type Error = PumpError;

    async fn poll(&self) -> Result<Vec<Delivery>, PumpError> {
        let reclaimed = self.claim_stalled().await?;
        if !reclaimed.is_empty() {
            debug!(count = reclaimed.len(), "reclaimed stalled deliveries");
            return Ok(reclaimed);
        }
        self.read_new().await
    }

    async fn commit(&self, tokens: &[AckToken]) -> Result<(), PumpError> {
        self.ack_many(tokens).await
    }
}

/// Parse an `XREAD`/`XREADGROUP` redis::Value reply into a Delivery list.
/// We stay purely on the deadpool-redis `redis` crate to avoid type/version
/// conflicts.
pub fn parse_xread_value(val: redis::Value) -> Vec<Delivery> {
    use deadpool_redis::redis::Value;
    let mut out = Vec::new();

    // Expected shape:
    // Array[
    //   Array[ stream_name, Array[ Array[ id, Array[ k1, v1, ... ] ], ... ] ],
    //   ...
    // ]
    let Value::Bulk(streams) = val else { return out };

    for s in streams {
        let Value::Bulk(stream_pair) = s else { continue };
        if stream_pair.len() != 2 {
            continue;
        }
        collect_entries(&stream_pair[1], &mut out);
    }

    out
}

/// Parse an `XAUTOCLAIM` reply. The entry list sits at index 1, after the
/// next-scan cursor; Redis 7 appends a third element of deleted ids.
pub fn parse_autoclaim_value(val: redis::Value) -> Vec<Delivery> {
    use deadpool_redis::redis::Value;
    let mut out = Vec::new();

    let Value::Bulk(parts) = val else { return out };
    if let Some(entries) = parts.get(1) {
        collect_entries(entries, &mut out);
    }

    out
}

fn collect_entries(entries: &redis::Value, out: &mut Vec<Delivery>) {
    use deadpool_redis::redis::Value;

    let Value::Bulk(msgs) = entries else { return };
    for m in msgs {
        let Value::Bulk(pair) = m else { continue };
        if pair.len() != 2 {
            continue;
        }
        let id = match &pair[0] {
            Value::Data(b) => String::from_utf8_lossy(b).to_string(),
            _ => continue,
        };
        let Value::Bulk(kv) = &pair[1] else { continue };

        let mut payload: Option<Bytes> = None;
        let mut i = 0;
        while i + 1 < kv.len() {
            match (&kv[i], &kv[i + 1]) {
                (Value::Data(k), Value::Data(v)) if k == b"payload" => {
                    payload = Some(Bytes::from(v.clone()));
                    break;
                }
                _ => {}
            }
            i += 2;
        }

        if let Some(p) = payload {
            out.push(Delivery { id, payload: p });
        }
    }
}
