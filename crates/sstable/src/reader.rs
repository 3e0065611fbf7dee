use byteorder::{LittleEndian, ReadBytesExt};
use parking_lot::Mutex;
use record::{Record, RecordError, LENGTH_PREFIX_BYTES, MIN_RECORD_BYTES};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::SegmentError;

/// Exact per-segment lookup table: key -> byte offset of the record's
/// length prefix.
///
/// This is deliberately its own type rather than a bare map: it is the seam
/// where a sparser strategy (per-block index plus bloom filter) would slot
/// in without touching the read path.
#[derive(Debug, Default)]
pub struct SegmentIndex {
    map: std::collections::HashMap<String, u64>,
}

impl SegmentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: String, offset: u64) {
        self.map.insert(key, offset);
    }

    /// Offset of the record's length prefix, if the key is present.
    pub fn lookup(&self, key: &str) -> Option<u64> {
        self.map.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// A read-only handle to one on-disk segment plus its in-memory index.
///
/// The file handle stays open for the segment's lifetime, wrapped in a
/// `Mutex` so `read_record` works through a shared reference; a point
/// lookup is one seek plus two reads.
pub struct Segment {
    path: PathBuf,
    file: Mutex<File>,
    index: SegmentIndex,
}

impl Segment {
    /// Opens a segment discovered on disk, rebuilding its index with one
    /// sequential scan.
    ///
    /// Fails with a `NotFound` I/O error if the file is absent, and with a
    /// parse error if any record is malformed; published segments were
    /// fsynced before their rename, so damage here is real corruption.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        let mut index = SegmentIndex::new();
        let mut rdr = BufReader::new(file);
        let mut offset = 0u64;
        let mut frame = Vec::with_capacity(256);

        loop {
            let len = match rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };
            if (len as usize) < MIN_RECORD_BYTES {
                return Err(SegmentError::Record {
                    offset,
                    source: RecordError::Truncated(len as usize),
                });
            }

            frame.clear();
            frame.extend_from_slice(&len.to_le_bytes());
            frame.resize(len as usize, 0);
            rdr.read_exact(&mut frame[LENGTH_PREFIX_BYTES..])?;

            let rec = record::decode(&frame)
                .map_err(|source| SegmentError::Record { offset, source })?;
            index.insert(rec.key, offset);

            offset += len as u64;
        }

        let mut file = rdr.into_inner();
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
        })
    }

    /// Reopens a freshly written segment with the index its writer built,
    /// skipping the scan.
    pub(crate) fn from_parts(path: PathBuf, index: SegmentIndex) -> Result<Self, SegmentError> {
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            index,
        })
    }

    /// Reads and decodes the record whose length prefix starts at `offset`.
    pub fn read_record(&self, offset: u64) -> Result<Record, SegmentError> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let len = file.read_u32::<LittleEndian>()?;
        if (len as usize) < MIN_RECORD_BYTES {
            return Err(SegmentError::Record {
                offset,
                source: RecordError::Truncated(len as usize),
            });
        }

        let mut frame = vec![0u8; len as usize];
        frame[..LENGTH_PREFIX_BYTES].copy_from_slice(&len.to_le_bytes());
        file.read_exact(&mut frame[LENGTH_PREFIX_BYTES..])?;
        drop(file);

        record::decode(&frame).map_err(|source| SegmentError::Record { offset, source })
    }

    /// Point lookup: index probe plus one record read.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SegmentError> {
        let offset = match self.index.lookup(key) {
            Some(o) => o,
            None => return Ok(None),
        };

        let rec = self.read_record(offset)?;
        if rec.key != key {
            return Err(SegmentError::IndexMismatch);
        }
        Ok(Some(rec.value))
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in this segment.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("path", &self.path)
            .field("records", &self.index.len())
            .finish()
    }
}
