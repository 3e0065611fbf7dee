//! Write path: `set()` plus key validation.
//!
//! A write commits to the active memtable first (readers see it from that
//! moment), then appends to the WAL and waits for the fsync; only then is
//! the call acknowledged. The memtable lock is released before the WAL
//! append so readers are never blocked behind disk.

use record::Record;

use crate::{notify, Db, DbError, Result};

impl Db {
    /// Inserts or replaces a key.
    ///
    /// Returns once the record is durable in the WAL. If the memtable's
    /// size estimate has crossed the configured threshold, a flush is
    /// scheduled (non-blocking, coalesced).
    pub fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.inner.check_open()?;
        validate_key(key)?;

        let rec = Record::new(key, value.to_vec());
        // Reject anything the u32 length frame cannot carry before it
        // touches the memtable or the log.
        rec.encoded_len()?;

        let size = {
            let mut tables = self.inner.memtables.write();
            tables.active.set(key.to_string(), value.to_vec());
            tables.active.size()
        };

        {
            let mut wal = self.inner.wal.lock();
            wal.append(&rec)?;
        }

        if size > self.inner.opts.max_memtable_size {
            notify(&self.inner.flush_tx);
        }
        Ok(())
    }
}

/// Keys are non-empty and must not contain the record separator byte; a
/// key with an embedded NUL would silently misparse on decode.
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DbError::InvalidKey("key must not be empty".into()));
    }
    if key.bytes().any(|b| b == record::KEY_VALUE_SEPARATOR) {
        return Err(DbError::InvalidKey(
            "key must not contain a NUL byte".into(),
        ));
    }
    Ok(())
}
