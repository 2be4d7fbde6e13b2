//! Envelope encoding (notification JSON)
//!
//! Overview
//! --------
//! Wraps a subject and body into the notification envelope the decoder
//! recognizes. Field order is part of the wire shape: `Subject` must appear
//! before `Message`, which serde guarantees by serializing struct fields in
//! declaration order.
//!
//! Compatibility
//! -------------
//! - New fields should be appended after `Timestamp`; the decoder ignores
//!   anything it does not scan for.

use crate::errors::PumpError;
use crate::util::time::unix_seconds;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<'a> {
    r#type: &'a str,
    subject: &'a str,
    message: &'a str,
    timestamp: u64,
}

pub fn encode_envelope(subject: &str, body: &str) -> Result<String, PumpError> {
    let envelope = Envelope {
        r#type: "Notification",
        subject,
        message: body,
        timestamp: unix_seconds(),
    };
    serde_json::to_string(&envelope).map_err(|e| PumpError::Serialize(e.to_string()))
}
