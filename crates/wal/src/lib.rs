//! # WAL - Write-Ahead Log
//!
//! Crash-safe durability for the EddyKV storage engine.
//!
//! Every `SET` is appended here **before** the engine acknowledges it; the
//! call does not return until the bytes are fsynced. On restart a non-empty
//! WAL is replayed to rebuild the memtable that was never flushed, then the
//! file is truncated. The engine also truncates after every successful
//! segment flush, so the WAL only ever covers memtable contents that are
//! not yet on disk in a segment.
//!
//! Records use the shared codec framing (see the `record` crate):
//!
//! ```text
//! [len: u32 LE][key][0x00][value]
//! ```
//!
//! ## Failure model
//!
//! An append that dies mid-record leaves a torn tail. [`WalReader::replay`]
//! detects that (a length prefix promising more bytes than the file still
//! has) and stops cleanly, keeping every complete record before it. A
//! *complete* record that fails to parse is corruption and is surfaced as
//! an error instead.
//!
//! By design there is a single writer; the engine serializes appends behind
//! its own lock.

use byteorder::{LittleEndian, ReadBytesExt};
use record::{Record, RecordError, LENGTH_PREFIX_BYTES, MIN_RECORD_BYTES};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A structurally complete record failed to parse.
    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    /// A length prefix below the minimum frame: the log is damaged in a
    /// way torn-tail tolerance cannot explain.
    #[error("corrupt wal record")]
    Corrupt,
}

/// Append-only WAL writer.
///
/// Each record is serialized into a reusable scratch buffer and written
/// with a single `write_all`, then `sync_all` so the record is durable
/// before the call returns.
pub struct WalWriter {
    file: File,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file,
            buf: Vec::with_capacity(256),
        })
    }

    /// Appends one record and fsyncs before returning.
    pub fn append(&mut self, rec: &Record) -> Result<(), WalError> {
        self.buf.clear();
        record::encode(&mut self.buf, rec)?;
        self.file.write_all(&self.buf)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Appends a batch of records with a single fsync at the end.
    ///
    /// Used by the flush worker to re-seed the log right after truncating
    /// it; per-record durability is pointless there because nothing is
    /// acknowledged until the whole batch is down.
    pub fn append_batch(&mut self, recs: &[Record]) -> Result<(), WalError> {
        for rec in recs {
            self.buf.clear();
            record::encode(&mut self.buf, rec)?;
            self.file.write_all(&self.buf)?;
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Truncates the log to zero bytes and repositions at the start.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

/// Sequential WAL reader that yields every complete record.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    ///
    /// A missing file is an `Io` error with `NotFound` kind; the engine
    /// treats that as a fresh start.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every complete record, calling `apply` for each one.
    ///
    /// # Termination
    ///
    /// - Clean EOF -> `Ok(())`.
    /// - Torn tail (partial prefix, or a prefix promising more bytes than
    ///   remain) -> `Ok(())` after yielding the records before it.
    /// - Length prefix below the minimum frame -> `Err(WalError::Corrupt)`.
    /// - Complete record without a separator, or with a non-UTF-8 key ->
    ///   `Err(WalError::Record(_))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Record),
    {
        // One reusable frame buffer; decode wants the length prefix
        // included, so it is reassembled at the front.
        let mut frame = Vec::with_capacity(256);

        loop {
            let len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            if (len as usize) < MIN_RECORD_BYTES {
                return Err(WalError::Corrupt);
            }
            let body_len = len as usize - LENGTH_PREFIX_BYTES;

            frame.clear();
            frame.extend_from_slice(&len.to_le_bytes());

            // take + read_to_end grows the buffer only as far as the file
            // actually goes, so a garbage prefix cannot force a huge
            // allocation and a torn tail shows up as a short read.
            let got = (&mut self.rdr)
                .take(body_len as u64)
                .read_to_end(&mut frame)?;
            if got < body_len {
                return Ok(());
            }

            apply(record::decode(&frame)?);
        }
    }
}
