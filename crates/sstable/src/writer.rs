use memtable::Memtable;
use record::Record;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{Segment, SegmentError, SegmentIndex};

/// Streams sorted records into a new segment file.
///
/// The writer targets `<name>.tmp` and only [`finish`](Self::finish) makes
/// the segment visible, via fsync plus an atomic rename. The key -> offset
/// index is built while writing, so the finished [`Segment`] is queryable
/// without a scan.
///
/// The `.tmp` file is opened with exclusive-create semantics; two actors
/// racing for the same segment name is a naming bug and surfaces as an
/// `AlreadyExists` I/O error.
pub struct SegmentWriter {
    final_path: PathBuf,
    tmp_path: PathBuf,
    out: BufWriter<File>,
    index: SegmentIndex,
    offset: u64,
}

impl SegmentWriter {
    /// Creates `<path>.tmp` for writing. Fails with `AlreadyExists` if
    /// either the temp file or the final segment name is taken.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let final_path = path.as_ref().to_path_buf();
        let tmp_path = final_path.with_extension("tmp");

        if final_path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("segment {} already exists", final_path.display()),
            )
            .into());
        }
        let file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;

        Ok(Self {
            final_path,
            tmp_path,
            out: BufWriter::new(file),
            index: SegmentIndex::new(),
            offset: 0,
        })
    }

    /// Appends one record and records its offset in the index.
    ///
    /// Callers are responsible for feeding records in ascending key order
    /// with unique keys: both the flush path (iterating a `BTreeMap`) and
    /// the merge path (k-way merge output) produce exactly that.
    pub fn append(&mut self, rec: &Record) -> Result<(), SegmentError> {
        let offset = self.offset;
        let len = rec
            .encoded_len()
            .map_err(|source| SegmentError::Record { offset, source })?;

        record::encode(&mut self.out, rec).map_err(|source| match source {
            record::RecordError::Io(e) => SegmentError::Io(e),
            other => SegmentError::Record {
                offset,
                source: other,
            },
        })?;

        self.index.insert(rec.key.clone(), offset);
        self.offset += len as u64;
        Ok(())
    }

    /// Flushes, fsyncs, renames `<name>.tmp` into place, and reopens the
    /// published file read-only with the index built during writing.
    pub fn finish(mut self) -> Result<Segment, SegmentError> {
        self.out.flush()?;
        let file = self.out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.final_path)?;

        Segment::from_parts(self.final_path, self.index)
    }

    /// Discards the partial output, deleting the `.tmp` file. Used when a
    /// merge fails before publication.
    pub fn abort(self) {
        let SegmentWriter { tmp_path, out, .. } = self;
        drop(out);
        let _ = fs::remove_file(tmp_path);
    }

    /// Convenience for the flush path: serialize a whole memtable to
    /// `path` and return the published segment.
    pub fn write_memtable(path: &Path, mem: &Memtable) -> Result<Segment, SegmentError> {
        let mut writer = SegmentWriter::create(path)?;
        for (key, value) in mem.iter() {
            writer.append(&Record::new(key, value.to_vec()))?;
        }
        writer.finish()
    }
}
