use async_trait::async_trait;
use tracing::info;

use crate::emit::Publisher;
use crate::errors::PumpError;
use crate::message::Message;

/// Invoked once per failed message. Engines log and swallow router errors;
/// a broken route never takes the consumption loop down with it.
#[async_trait]
pub trait FailureRouter: Send + Sync {
    async fn handle_failure(&self, message: &Message) -> Result<(), PumpError>;
}

/// Republishes failed message bodies under a dead-letter subject. The sink
/// is an ordinary destination; another consumer instance drains it.
pub struct DeadLetterForwarder<P: Publisher> {
    publisher: P,
    subject: String,
}

impl<P: Publisher> DeadLetterForwarder<P> {
    pub fn new(publisher: P, subject: &str) -> Self {
        Self {
            publisher,
            subject: subject.to_string(),
        }
    }
}

#[async_trait]
impl<P: Publisher> FailureRouter for DeadLetterForwarder<P> {
    async fn handle_failure(&self, message: &Message) -> Result<(), PumpError> {
        let id = self.publisher.publish(&self.subject, message.body()).await?;
        info!(source_id = %message.id(), dead_letter_id = %id, "routed to dead letter");
        Ok(())
    }
}
