//! Publisher over a suffix-resolved Redis stream.

use async_trait::async_trait;
use deadpool_redis::{redis::cmd, Pool};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::emit::Publisher;
use crate::errors::PumpError;
use crate::redis::resolve_stream_key;
use crate::transform::encode::encode_envelope;

/// Resolves its destination lazily on first publish and caches the key for
/// the life of the publisher. Call `resolve` eagerly to fail fast at startup.
pub struct RedisPublisher {
    pool: Pool,
    target: String,
    resolved: OnceCell<String>,
}

impl RedisPublisher {
    pub fn new(pool: Pool, target: &str) -> Self {
        Self {
            pool,
            target: target.to_string(),
            resolved: OnceCell::new(),
        }
    }

    pub async fn resolve(&self) -> Result<&str, PumpError> {
        let key = self
            .resolved
            .get_or_try_init(|| resolve_stream_key(&self.pool, &self.target))
            .await?;
        Ok(key.as_str())
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, subject: &str, body: &str) -> Result<String, PumpError> {
        let stream = self.resolve().await?.to_string();
        let payload = encode_envelope(subject, body)?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| PumpError::RedisInit(e.to_string()))?;
        let id: String = cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("payload")
            .arg(&payload)
            .query_async(&mut *conn)
            .await
            .map_err(|e| PumpError::Publish(e.to_string()))?;

        debug!(stream = %stream, id = %id, subject = %subject, "published");
        Ok(id)
    }
}
