//! Decoded consumption unit shared by processors and failure routing.

/// Token handed back to the backend to acknowledge a delivery. Receipt id
/// for queue-style sources, sequence id for stream-style sources.
pub type AckToken = String;

/// Immutable message as seen by a processor. `id` carries the backend token;
/// `subject` and `message_type` are present only when the payload arrived
/// enveloped or the producer set them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: String,
    subject: Option<String>,
    message_type: Option<String>,
    body: String,
}

impl Message {
    /// A bare message whose body is the raw payload text.
    pub fn new(id: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: None,
            message_type: None,
            body: body.to_string(),
        }
    }

    /// A message extracted from an envelope.
    pub fn enveloped(id: &str, subject: &str, body: &str) -> Self {
        Self {
            id: id.to_string(),
            subject: Some(subject.to_string()),
            message_type: None,
            body: body.to_string(),
        }
    }

    pub fn with_message_type(mut self, message_type: &str) -> Self {
        self.message_type = Some(message_type.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}
