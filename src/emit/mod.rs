//! Publishing seam. Engines consume; anything that needs to emit (dead
//! letter routing, demo producers, tests) goes through `Publisher`.

pub mod dlq;
pub mod redis;

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::PumpError;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Wrap `body` in an envelope under `subject` and send it. Returns the
    /// backend-assigned message id.
    async fn publish(&self, subject: &str, body: &str) -> Result<String, PumpError>;
}

/// Serialize-then-publish convenience for typed payloads. Provided for every
/// `Publisher` rather than baked into the trait, so transports only ever
/// implement plain text publishing.
#[async_trait]
pub trait PublisherExt: Publisher {
    async fn publish_object<T>(&self, subject: &str, value: &T) -> Result<String, PumpError>
    where
        T: Serialize + Sync,
    {
        let body =
            serde_json::to_string(value).map_err(|e| PumpError::Serialize(e.to_string()))?;
        self.publish(subject, &body).await
    }
}

#[async_trait]
impl<P: Publisher + ?Sized> PublisherExt for P {}
