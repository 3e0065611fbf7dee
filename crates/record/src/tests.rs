use super::*;

fn encode_to_vec(rec: &Record) -> Vec<u8> {
    let mut buf = Vec::new();
    encode(&mut buf, rec).unwrap();
    buf
}

// -------------------- Wire layout --------------------

#[test]
fn encode_matches_documented_layout() {
    // {key: "name", value: "Bob"} -> len 12, "name", 0x00, "Bob"
    let rec = Record::new("name", b"Bob".to_vec());
    let buf = encode_to_vec(&rec);

    assert_eq!(
        buf,
        vec![12, 0, 0, 0, 110, 97, 109, 101, 0, 66, 111, 98],
    );
}

#[test]
fn length_prefix_counts_itself() {
    let rec = Record::new("k", b"v".to_vec());
    // 4 (prefix) + 1 (key) + 1 (sep) + 1 (value)
    assert_eq!(rec.encoded_len().unwrap(), 7);
    assert_eq!(encode_to_vec(&rec).len(), 7);
}

#[test]
fn empty_value_is_legal() {
    let rec = Record::new("k", Vec::new());
    let buf = encode_to_vec(&rec);
    assert_eq!(buf, vec![6, 0, 0, 0, b'k', 0]);

    let back = decode(&buf).unwrap();
    assert_eq!(back.key, "k");
    assert!(back.value.is_empty());
}

// -------------------- Round trip --------------------

#[test]
fn decode_inverts_encode() {
    let rec = Record::new("name", b"Bob".to_vec());
    let back = decode(&encode_to_vec(&rec)).unwrap();
    assert_eq!(back, rec);
}

#[test]
fn binary_values_survive() {
    // Values are opaque; 0x00 inside the value must not confuse the split,
    // because decode takes the FIRST separator.
    let rec = Record::new("bin", vec![0xDE, 0x00, 0xAD, 0x00]);
    let back = decode(&encode_to_vec(&rec)).unwrap();
    assert_eq!(back.value, vec![0xDE, 0x00, 0xAD, 0x00]);
}

#[test]
fn decoded_order_is_zero() {
    let mut rec = Record::new("k", b"v".to_vec());
    rec.order = 7;
    let back = decode(&encode_to_vec(&rec)).unwrap();
    assert_eq!(back.order, 0);
}

// -------------------- Malformed input --------------------

#[test]
fn decode_rejects_short_buffer() {
    assert!(matches!(
        decode(&[5, 0, 0, 0, b'k']),
        Err(RecordError::Truncated(5))
    ));
}

#[test]
fn decode_rejects_missing_separator() {
    let buf = vec![8, 0, 0, 0, b'a', b'b', b'c', b'd'];
    assert!(matches!(decode(&buf), Err(RecordError::MissingSeparator)));
}

#[test]
fn decode_rejects_non_utf8_key() {
    let buf = vec![7, 0, 0, 0, 0xFF, 0xFE, 0x00];
    assert!(matches!(decode(&buf), Err(RecordError::InvalidKey)));
}

// -------------------- Ordering --------------------

#[test]
fn records_order_by_key_then_stream() {
    let a = Record {
        key: "a".into(),
        value: b"1".to_vec(),
        order: 5,
    };
    let b = Record {
        key: "b".into(),
        value: b"1".to_vec(),
        order: 0,
    };
    assert!(a < b, "key dominates order");

    let a_new = Record { order: 9, ..a.clone() };
    assert!(a < a_new, "equal keys fall back to stream order");
}
