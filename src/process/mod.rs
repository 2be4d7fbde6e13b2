//! Processing seam between the engines and business logic.

pub mod builtin;

use crate::errors::PumpError;
use crate::message::{AckToken, Message};
use async_trait::async_trait;

/// Handles one decoded message. Success returns the token to acknowledge,
/// normally `message.id()`; any error marks the message failed for this
/// delivery and leaves redelivery to the backend.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, message: &Message) -> Result<AckToken, PumpError>;
}

#[async_trait]
impl Processor for Box<dyn Processor> {
    async fn process(&self, message: &Message) -> Result<AckToken, PumpError> {
        (**self).process(message).await
    }
}
