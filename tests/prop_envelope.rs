use bytes::Bytes;
use message_pump::ingest::Delivery;
use message_pump::transform::decode::{decode_delivery, parse_envelope, Payload};
use message_pump::transform::encode::encode_envelope;
use proptest::prelude::*;
use proptest::string::string_regex;

// Quote-free text can never satisfy the envelope shape, so it must always
// pass through as a raw body.
fn quote_free_text() -> impl Strategy<Value = String> {
    let ascii = string_regex(r#"[^"]{0,1024}"#).unwrap();
    let unicode = proptest::collection::vec(
        any::<char>().prop_filter("no quotes", |c| *c != '"'),
        0..256,
    )
    .prop_map(|v| v.into_iter().collect::<String>());
    prop_oneof![ascii, unicode]
}

// Field values the encoder emits verbatim: no quotes, backslashes, or
// control characters that JSON serialization would escape.
fn subject_text() -> impl Strategy<Value = String> {
    string_regex(r"[A-Za-z0-9][A-Za-z0-9 _-]{0,32}").unwrap()
}

fn body_text() -> impl Strategy<Value = String> {
    string_regex(r"[A-Za-z0-9 .,_-]{1,256}").unwrap()
}

fn multiline_body() -> impl Strategy<Value = String> {
    string_regex(r"[A-Za-z0-9 .,_-]{1,64}(\n[A-Za-z0-9 .,_-]{1,64}){0,4}").unwrap()
}

proptest! {
  // Anything without the envelope shape decodes to itself.
  #[test]
  fn unenveloped_text_passes_through(raw in quote_free_text()) {
      prop_assert_eq!(parse_envelope(&raw), Payload::Raw);

      let msg = decode_delivery(&Delivery {
          id: "r-1".to_string(),
          payload: Bytes::from(raw.clone().into_bytes()),
      });
      prop_assert_eq!(msg.body(), raw.as_str());
      prop_assert!(msg.subject().is_none());
  }

  // Encoded envelopes come back with the same subject and body.
  #[test]
  fn encoded_envelopes_round_trip(subject in subject_text(), body in body_text()) {
      let text = encode_envelope(&subject, &body).expect("encode");
      prop_assert_eq!(
          parse_envelope(&text),
          Payload::Enveloped { subject: subject.clone(), body: body.clone() }
      );
  }

  // The fields are found wherever they sit inside a larger blob, and the
  // body may span lines.
  #[test]
  fn envelope_is_found_amid_noise(
      prefix in quote_free_text(),
      suffix in quote_free_text(),
      subject in subject_text(),
      body in multiline_body(),
  ) {
      let text = format!(
          "{prefix}\"Subject\" : \"{subject}\",\n\"Message\": \"{body}\"{suffix}"
      );
      prop_assert_eq!(
          parse_envelope(&text),
          Payload::Enveloped { subject: subject.clone(), body: body.clone() }
      );
  }
}
