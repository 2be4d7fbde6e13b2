use crate::ingest::Delivery;
use crate::message::Message;

const SUBJECT_KEY: &str = "\"Subject\"";
const MESSAGE_KEY: &str = "\"Message\"";

/// Outcome of a best-effort envelope scan. `Raw` is not an error; it means
/// the payload was produced without an envelope and is consumed as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Enveloped { subject: String, body: String },
    Raw,
}

/// Scans `text` for a quoted `Subject` field followed by a quoted `Message`
/// field. Captures are the raw text between the quotes, no unescaping; the
/// message body may span lines, and content after it is ignored. Anything
/// that does not satisfy the full shape is `Raw`.
pub fn parse_envelope(text: &str) -> Payload {
    let mut from = 0;
    while let Some(at) = text[from..].find(SUBJECT_KEY) {
        let key_end = from + at + SUBJECT_KEY.len();
        if let Some((subject, rest)) = quoted_value(&text[key_end..]) {
            if let Some((body, _)) = find_field(rest, MESSAGE_KEY) {
                return Payload::Enveloped { subject, body };
            }
        }
        from = key_end;
    }
    Payload::Raw
}

/// Decode a delivery into a `Message`, falling back to the raw payload text
/// when no envelope is found. The delivery id is carried through untouched.
pub fn decode_delivery(delivery: &Delivery) -> Message {
    let text = String::from_utf8_lossy(&delivery.payload);
    match parse_envelope(&text) {
        Payload::Enveloped { subject, body } => Message::enveloped(&delivery.id, &subject, &body),
        Payload::Raw => Message::new(&delivery.id, &text),
    }
}

/// First occurrence of `key` in `text` that is followed by a well-formed
/// quoted value. Malformed occurrences are skipped, not fatal.
fn find_field<'a>(text: &'a str, key: &str) -> Option<(String, &'a str)> {
    let mut from = 0;
    while let Some(at) = text[from..].find(key) {
        let key_end = from + at + key.len();
        if let Some(found) = quoted_value(&text[key_end..]) {
            return Some(found);
        }
        from = key_end;
    }
    None
}

/// Expects `: "value"` with any whitespace (including newlines) around the
/// separator. Returns the non-empty capture and the remainder after its
/// closing quote.
fn quoted_value(after_key: &str) -> Option<(String, &str)> {
    let rest = after_key.trim_start().strip_prefix(':')?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    if end == 0 {
        return None;
    }
    Some((rest[..end].to_string(), &rest[end + 1..]))
}
