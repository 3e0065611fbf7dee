use crate::{Segment, SegmentError, SegmentWriter};
use record::Record;
use std::fs;
use tempfile::tempdir;

fn write_segment(dir: &std::path::Path, name: &str, entries: &[(&str, &[u8])]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut w = SegmentWriter::create(&path).unwrap();
    for &(k, v) in entries {
        w.append(&Record::new(k, v.to_vec())).unwrap();
    }
    w.finish().unwrap();
    path
}

// -------------------- Open & scan --------------------

#[test]
fn open_rebuilds_the_index_by_scanning() {
    let dir = tempdir().unwrap();
    let path = write_segment(
        dir.path(),
        "seg-a",
        &[("a", b"1"), ("b", b"2"), ("c", b"3")],
    );

    // A fresh open has no writer-built index to inherit.
    let seg = Segment::open(&path).unwrap();
    assert_eq!(seg.len(), 3);
    assert_eq!(seg.get("a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(seg.get("b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(seg.get("c").unwrap(), Some(b"3".to_vec()));
    assert_eq!(seg.get("d").unwrap(), None);
}

#[test]
fn open_missing_file_is_not_found() {
    let dir = tempdir().unwrap();
    let result = Segment::open(dir.path().join("absent"));
    match result {
        Err(SegmentError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn open_empty_file_yields_empty_segment() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seg-a");
    fs::write(&path, b"").unwrap();

    let seg = Segment::open(&path).unwrap();
    assert!(seg.is_empty());
    assert_eq!(seg.get("anything").unwrap(), None);
}

// -------------------- read_record --------------------

#[test]
fn read_record_at_known_offsets() {
    let dir = tempdir().unwrap();
    let path = write_segment(dir.path(), "seg-a", &[("aa", b"11"), ("bb", b"22")]);

    let seg = Segment::open(&path).unwrap();
    // Each record is 4 + 2 + 1 + 2 = 9 bytes.
    let first = seg.read_record(0).unwrap();
    assert_eq!(first.key, "aa");
    assert_eq!(first.value, b"11");

    let second = seg.read_record(9).unwrap();
    assert_eq!(second.key, "bb");
    assert_eq!(second.value, b"22");
}

#[test]
fn repeated_reads_through_shared_reference() {
    let dir = tempdir().unwrap();
    let path = write_segment(dir.path(), "seg-a", &[("k", b"v")]);
    let seg = Segment::open(&path).unwrap();

    // The handle lives behind a mutex; consecutive lookups must not
    // disturb each other's seeks.
    for _ in 0..10 {
        assert_eq!(seg.get("k").unwrap(), Some(b"v".to_vec()));
    }
}

// -------------------- Corruption --------------------

#[test]
fn open_rejects_record_without_separator() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seg-a");
    // One "record": len 8, four body bytes, none of them 0x00.
    fs::write(&path, [8, 0, 0, 0, b'a', b'b', b'c', b'd']).unwrap();

    assert!(matches!(
        Segment::open(&path),
        Err(SegmentError::Record { offset: 0, .. })
    ));
}

#[test]
fn open_rejects_undersized_length_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seg-a");
    fs::write(&path, [2, 0, 0, 0, 0, 0]).unwrap();

    assert!(matches!(
        Segment::open(&path),
        Err(SegmentError::Record { offset: 0, .. })
    ));
}

#[test]
fn open_rejects_truncated_file() {
    let dir = tempdir().unwrap();
    let path = write_segment(dir.path(), "seg-a", &[("key", b"value")]);

    // Chop the tail off; unlike the WAL, a segment must be complete.
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

    assert!(matches!(Segment::open(&path), Err(SegmentError::Io(_))));
}
