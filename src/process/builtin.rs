//! Stock processors: a logger, a failure injector, and a typed JSON handler.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::info;

use crate::errors::PumpError;
use crate::message::{AckToken, Message};
use crate::process::Processor;

/// Logs every message and acknowledges it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProcessor;

#[async_trait]
impl Processor for LogProcessor {
    async fn process(&self, message: &Message) -> Result<AckToken, PumpError> {
        info!(
            id = %message.id(),
            subject = message.subject().unwrap_or("-"),
            body = %message.body(),
            "message received"
        );
        Ok(message.id().to_string())
    }
}

/// Fails any message whose body contains the marker, acknowledges the rest.
/// Useful for exercising failure routing against live traffic.
#[derive(Debug, Clone)]
pub struct PoisonPillProcessor {
    marker: String,
}

impl PoisonPillProcessor {
    pub fn new() -> Self {
        Self::with_marker("Poison pill")
    }

    pub fn with_marker(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
        }
    }
}

impl Default for PoisonPillProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Processor for PoisonPillProcessor {
    async fn process(&self, message: &Message) -> Result<AckToken, PumpError> {
        if message.body().contains(&self.marker) {
            return Err(PumpError::Process(format!(
                "poison pill in message {}",
                message.id()
            )));
        }
        info!(id = %message.id(), "message accepted");
        Ok(message.id().to_string())
    }
}

/// Deserializes the body into `T` and hands it to the wrapped handler.
/// A body that does not parse is an ordinary processing failure.
pub struct JsonProcessor<T, F> {
    handler: F,
    _payload: PhantomData<fn(T)>,
}

impl<T, F> JsonProcessor<T, F>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Result<(), PumpError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> Processor for JsonProcessor<T, F>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Result<(), PumpError> + Send + Sync,
{
    async fn process(&self, message: &Message) -> Result<AckToken, PumpError> {
        let value: T = serde_json::from_str(message.body())
            .map_err(|e| PumpError::Process(format!("payload deserialize: {e}")))?;
        (self.handler)(value)?;
        Ok(message.id().to_string())
    }
}
