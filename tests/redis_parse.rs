//! Unit tests for parsing `XREADGROUP` and `XAUTOCLAIM` responses into
//! `Delivery` values.

use bytes::Bytes;
use deadpool_redis::redis::Value;
use message_pump::ingest::Delivery;
use message_pump::redis::{parse_autoclaim_value, parse_xread_value};

#[test]
fn parse_minimal_xread_reply() {
    let reply = Value::Bulk(vec![Value::Bulk(vec![
        Value::Data(b"orders".to_vec()),
        Value::Bulk(vec![Value::Bulk(vec![
            Value::Data(b"1-0".to_vec()),
            Value::Bulk(vec![
                Value::Data(b"payload".to_vec()),
                Value::Data(b"order 42".to_vec()),
            ]),
        ])]),
    ])]);

    let msgs: Vec<Delivery> = parse_xread_value(reply);
    assert_eq!(msgs.len(), 1);
    let msg = &msgs[0];
    assert_eq!(msg.id, "1-0");
    assert_eq!(msg.payload, Bytes::from_static(b"order 42"));
}

#[test]
fn parse_ignores_missing_payload() {
    let reply = Value::Bulk(vec![Value::Bulk(vec![
        Value::Data(b"orders".to_vec()),
        Value::Bulk(vec![Value::Bulk(vec![
            Value::Data(b"2-0".to_vec()),
            Value::Bulk(vec![Value::Data(b"k".to_vec()), Value::Data(b"v".to_vec())]),
        ])]),
    ])]);

    let msgs = parse_xread_value(reply);
    assert!(msgs.is_empty());
}

#[test]
fn parse_skips_other_fields_before_payload() {
    let reply = Value::Bulk(vec![Value::Bulk(vec![
        Value::Data(b"orders".to_vec()),
        Value::Bulk(vec![Value::Bulk(vec![
            Value::Data(b"3-0".to_vec()),
            Value::Bulk(vec![
                Value::Data(b"trace".to_vec()),
                Value::Data(b"abc".to_vec()),
                Value::Data(b"payload".to_vec()),
                Value::Data(b"order 43".to_vec()),
            ]),
        ])]),
    ])]);

    let msgs = parse_xread_value(reply);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].payload, Bytes::from_static(b"order 43"));
}

#[test]
fn parse_handles_empty_reply() {
    assert!(parse_xread_value(Value::Nil).is_empty());
    assert!(parse_xread_value(Value::Bulk(vec![])).is_empty());
}

#[test]
fn parse_autoclaim_reply_extracts_entries() {
    // Cursor first, entries second, Redis 7 adds a deleted-id list third.
    let reply = Value::Bulk(vec![
        Value::Data(b"0-0".to_vec()),
        Value::Bulk(vec![Value::Bulk(vec![
            Value::Data(b"4-0".to_vec()),
            Value::Bulk(vec![
                Value::Data(b"payload".to_vec()),
                Value::Data(b"order 44".to_vec()),
            ]),
        ])]),
        Value::Bulk(vec![]),
    ]);

    let msgs = parse_autoclaim_value(reply);
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].id, "4-0");
    assert_eq!(msgs[0].payload, Bytes::from_static(b"order 44"));
}

#[test]
fn parse_autoclaim_handles_short_replies() {
    assert!(parse_autoclaim_value(Value::Nil).is_empty());
    assert!(parse_autoclaim_value(Value::Bulk(vec![])).is_empty());
    assert!(parse_autoclaim_value(Value::Bulk(vec![Value::Data(b"0-0".to_vec())])).is_empty());
}
