//! Read path: `get()`.
//!
//! Freshness order: active memtable, then the flushing memtable if a flush
//! is in progress, then the segment snapshot newest to oldest. First hit
//! wins. A key being flushed stays continuously visible: it is in the
//! flushing memtable until the moment the published segment serves it.

use crate::{Db, DbError, Result};

impl Db {
    /// Looks up a key, returning its value or [`DbError::KeyNotFound`].
    pub fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.check_open()?;

        {
            let tables = self.inner.memtables.read();
            if let Some(value) = tables.active.get(key) {
                return Ok(value.to_vec());
            }
            if let Some(flushing) = &tables.flushing {
                if let Some(value) = flushing.get(key) {
                    return Ok(value.to_vec());
                }
            }
        }

        // Readers keep a snapshot for the whole lookup; a concurrent
        // publish swaps the list but never mutates this one.
        let snapshot = self.inner.segment_snapshot();
        for segment in snapshot.iter() {
            if let Some(value) = segment.get(key)? {
                return Ok(value);
            }
        }

        Err(DbError::KeyNotFound)
    }
}
