//! K-way merge and compaction of sorted record streams.
//!
//! The merge worker opens one [`SegmentStream`] per input segment and
//! funnels them through [`merge_streams`] into a fresh [`SegmentWriter`].
//! Output is sorted, each key appears exactly once, and for keys present
//! in several inputs the value from the newest stream (largest stream
//! index) survives.

use byteorder::{LittleEndian, ReadBytesExt};
use record::{Record, RecordError, LENGTH_PREFIX_BYTES, MIN_RECORD_BYTES};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::{IndexMinHeap, SegmentError, SegmentWriter};

/// Sequential reader yielding a segment's records in file order, which is
/// ascending key order, because segments are written sorted.
///
/// Opens its own file handle, so merging never contends with concurrent
/// point lookups on the same [`Segment`](crate::Segment).
pub struct SegmentStream {
    rdr: BufReader<File>,
    offset: u64,
}

impl SegmentStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let file = File::open(path)?;
        Ok(Self {
            rdr: BufReader::new(file),
            offset: 0,
        })
    }

    fn read_next(&mut self) -> Result<Option<Record>, SegmentError> {
        let len = match self.rdr.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if (len as usize) < MIN_RECORD_BYTES {
            return Err(SegmentError::Record {
                offset: self.offset,
                source: RecordError::Truncated(len as usize),
            });
        }

        let mut frame = vec![0u8; len as usize];
        frame[..LENGTH_PREFIX_BYTES].copy_from_slice(&len.to_le_bytes());
        self.rdr.read_exact(&mut frame[LENGTH_PREFIX_BYTES..])?;

        let offset = self.offset;
        self.offset += len as u64;

        record::decode(&frame)
            .map(Some)
            .map_err(|source| SegmentError::Record { offset, source })
    }
}

impl Iterator for SegmentStream {
    type Item = Result<Record, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Merges and compacts multiple sorted streams into `out`.
///
/// Callers must order `streams` oldest first: each record is tagged with
/// its stream index as `order`, and compaction keeps the value with the
/// largest `order` per key: the newest stream wins.
///
/// The heap pops equal keys in ascending stream order, so holding the
/// running record back until the key changes and overwriting its value on
/// every same-key pop leaves exactly the newest value. A stream may also
/// legally repeat a key it shadows internally; the same rule collapses
/// that.
pub fn merge_streams<I>(streams: Vec<I>, out: &mut SegmentWriter) -> Result<(), SegmentError>
where
    I: Iterator<Item = Result<Record, SegmentError>>,
{
    let mut streams = streams;
    let mut heap = IndexMinHeap::new(streams.len());

    // Seed the heap with the head of every stream.
    for (i, stream) in streams.iter_mut().enumerate() {
        if let Some(mut rec) = stream.next().transpose()? {
            rec.order = i;
            heap.insert(i, rec);
        }
    }

    let mut prev: Option<Record> = None;
    while let Some((i, rec)) = heap.min() {
        prev = match prev.take() {
            None => Some(rec),
            Some(mut held) => {
                if held.key != rec.key {
                    out.append(&held)?;
                    Some(rec)
                } else {
                    // Same key from a newer stream (or later in the same
                    // stream): latest value wins.
                    held.value = rec.value;
                    Some(held)
                }
            }
        };

        // Refill from the stream that produced the minimum, unless it is
        // exhausted.
        if let Some(mut next) = streams[i].next().transpose()? {
            next.order = i;
            heap.insert(i, next);
        }
    }

    if let Some(held) = prev {
        out.append(&held)?;
    }

    Ok(())
}
