//! # SSTable - sorted segment files
//!
//! Immutable, on-disk storage for the EddyKV engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! flush worker freezes it and streams it here as a *segment*: records
//! sorted by ascending key, each key at most once, never modified after
//! publication (only replaced during merging).
//!
//! ## File layout
//!
//! A segment is nothing but back-to-back records in the shared codec
//! framing:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ [len: u32 LE][key][0x00][value]              │
//! │ [len: u32 LE][key][0x00][value]              │
//! │ ... sorted by key, unique keys ...           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! There is no footer and no on-disk index. Each open segment carries a
//! [`SegmentIndex`] in memory mapping every key to the byte offset of its
//! length prefix; whoever writes a segment builds the index as a side
//! effect, and a segment discovered at startup rebuilds it with one
//! sequential scan.
//!
//! ## Writing
//!
//! [`SegmentWriter`] creates `<name>.tmp` with exclusive-create semantics,
//! streams records through a buffered writer, then fsyncs and atomically
//! renames into place on [`SegmentWriter::finish`]. A crash mid-write
//! leaves only a `.tmp` file that recovery deletes; a visible segment file
//! is always complete.
//!
//! ## Merging
//!
//! [`merge_streams`] runs the k-way merge: one [`SegmentStream`] per input
//! segment feeds an [`IndexMinHeap`] keyed by `(key, stream order)`, and
//! compaction keeps only the newest stream's value for each key.

mod heap;
mod merge;
mod reader;
mod writer;

pub use heap::IndexMinHeap;
pub use merge::{merge_streams, SegmentStream};
pub use reader::{Segment, SegmentIndex};
pub use writer::SegmentWriter;

use record::RecordError;
use thiserror::Error;

/// Errors from segment I/O and parsing.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A record in the file failed to parse. Unlike the WAL, a published
    /// segment was fsynced before its rename, so a bad record is
    /// corruption, never a tolerable torn tail.
    #[error("malformed record at offset {offset}: {source}")]
    Record {
        offset: u64,
        source: RecordError,
    },

    /// The in-memory index pointed at a record holding a different key.
    #[error("segment index points at the wrong record")]
    IndexMismatch,
}

#[cfg(test)]
mod tests;
