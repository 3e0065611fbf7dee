//! Cold-start recovery: WAL replay, segment discovery, orphan cleanup.
//!
//! A database directory contains exactly one `wal` file and any number of
//! `seg-<number>-<rev>` segment files. Both halves of a name are
//! zero-padded so lexicographic order equals numeric order, and numeric
//! order equals logical age: flushes take fresh numbers at revision 0,
//! a merge reuses its newest source's number at revision + 1. Ascending
//! name order is therefore always older-to-newer, which is exactly what
//! the read path's newest-first probe needs after a restart.

use memtable::Memtable;
use sstable::Segment;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wal::{WalError, WalReader};

use crate::Result;

/// Name of the write-ahead log inside the database directory.
pub(crate) const WAL_FILE: &str = "wal";

const SEGMENT_PREFIX: &str = "seg-";

/// `seg-<number:020>-<rev:04>`.
pub(crate) fn segment_file_name(number: u64, rev: u32) -> String {
    format!("{}{:020}-{:04}", SEGMENT_PREFIX, number, rev)
}

/// Inverse of [`segment_file_name`]; `None` for foreign files.
pub(crate) fn parse_segment_name(name: &str) -> Option<(u64, u32)> {
    let rest = name.strip_prefix(SEGMENT_PREFIX)?;
    let (number, rev) = rest.split_once('-')?;
    if number.len() != 20 || rev.len() != 4 {
        return None;
    }
    Some((number.parse().ok()?, rev.parse().ok()?))
}

fn list_segment_files(dir: &Path) -> Result<Vec<(u64, u32, PathBuf)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if let Some((number, rev)) = parse_segment_name(name) {
            found.push((number, rev, path));
        }
    }
    Ok(found)
}

/// Deletes leftover `.tmp` files from flushes or merges that never made it
/// to their rename. Best-effort: a file we cannot delete is left for the
/// next open.
pub(crate) fn remove_stale_tmp_files(dir: &Path) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(".tmp"))
            .unwrap_or(false);
        if is_tmp {
            tracing::info!(file = %path.display(), "removing stale tmp file");
            let _ = fs::remove_file(&path);
        }
    }
}

/// Garbage-collects segments subsumed by a published merge.
///
/// A merge retires its sources only after publishing the merged file; a
/// crash in between leaves both on disk. Merges always consume the oldest
/// segments, so a file with `rev >= 1` subsumes every segment file that
/// sorts before it.
pub(crate) fn remove_subsumed_segments(dir: &Path) -> Result<()> {
    let files = list_segment_files(dir)?;

    let best_merged = files
        .iter()
        .filter(|(_, rev, _)| *rev >= 1)
        .map(|(number, rev, _)| (*number, *rev))
        .max();
    let (best_number, best_rev) = match best_merged {
        Some(b) => b,
        None => return Ok(()),
    };

    for (number, rev, path) in &files {
        if (*number, *rev) < (best_number, best_rev) {
            tracing::info!(
                segment = %path.display(),
                "removing segment subsumed by a published merge"
            );
            fs::remove_file(path)?;
        }
    }
    Ok(())
}

/// Opens every surviving segment read-only, newest first, and returns the
/// list along with the next free segment number.
pub(crate) fn load_segments(dir: &Path) -> Result<(Vec<Arc<Segment>>, u64)> {
    let mut files = list_segment_files(dir)?;
    // Newest first: descending (number, rev).
    files.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));

    let next_number = files.first().map_or(0, |(number, _, _)| number + 1);

    let mut segments = Vec::with_capacity(files.len());
    for (_, _, path) in &files {
        segments.push(Arc::new(Segment::open(path)?));
    }
    Ok((segments, next_number))
}

/// Replays the WAL into a fresh memtable. A missing file is a fresh start;
/// a torn tail is tolerated by the reader and everything before it is
/// kept.
pub(crate) fn replay_wal(path: &Path) -> Result<Memtable> {
    match WalReader::open(path) {
        Ok(mut reader) => {
            let mut mem = Memtable::new();
            reader.replay(|rec| mem.set(rec.key, rec.value))?;
            Ok(mem)
        }
        Err(WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(Memtable::new()),
        Err(e) => Err(e.into()),
    }
}
