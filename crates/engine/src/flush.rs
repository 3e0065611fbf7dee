//! Flush worker: freeze the memtable, serialize it to a segment, publish,
//! reset the WAL.
//!
//! A single long-running thread. At-most-one flush is in flight by
//! construction, and the bounded(1) mailbox coalesces extra notifications.
//! A flush failure is fatal: the WAL may now hold records whose memtable
//! will never reach disk, so the worker records the error and exits;
//! operator recovery is restart plus WAL replay.

use crossbeam::channel::Receiver;
use record::Record;
use sstable::SegmentWriter;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::{notify, recovery, DbInner, Result, WorkerMsg};

pub(crate) fn run(inner: Arc<DbInner>, rx: Receiver<WorkerMsg>) {
    for msg in rx.iter() {
        match msg {
            WorkerMsg::Notify { ack } => match flush_once(&inner) {
                Ok(()) => {
                    if let Some(ack) = ack {
                        let _ = ack.send(Ok(()));
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "flush failed, worker exiting");
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(err.to_string()));
                    }
                    inner.record_fatal(err);
                    return;
                }
            },
            WorkerMsg::Shutdown => return,
        }
    }
}

/// One flush cycle. A no-op when the active memtable is empty (close
/// always posts a final notification, loaded or not).
fn flush_once(inner: &DbInner) -> Result<()> {
    // Freeze: publish the current memtable as "flushing" and install a
    // fresh active one. Writers resume immediately; readers probe active
    // then flushing.
    let frozen = {
        let mut tables = inner.memtables.write();
        if tables.active.is_empty() {
            return Ok(());
        }
        let frozen = Arc::new(std::mem::take(&mut tables.active));
        tables.flushing = Some(Arc::clone(&frozen));
        frozen
    };

    // Serialize to a fresh, monotonically named segment.
    let number = inner.next_segment.fetch_add(1, Ordering::SeqCst);
    let path = inner.dir.join(recovery::segment_file_name(number, 0));
    let segment = SegmentWriter::write_memtable(&path, &frozen)?;
    tracing::info!(
        segment = %path.display(),
        records = segment.len(),
        "memtable flushed"
    );

    // Publish: new list with the fresh segment at the head.
    let list_len = {
        let _publish = inner.publish_lock.lock();
        let current = inner.segment_snapshot();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.push(Arc::new(segment));
        next.extend(current.iter().cloned());
        let len = next.len();
        *inner.segments.write() = Arc::new(next);
        len
    };

    // Reset the WAL. Everything it held for the frozen memtable is now in
    // the published segment, but writers may have appended records for the
    // NEW active memtable in the meantime; those must not lose coverage.
    // Under the WAL lock the active memtable is re-encoded after the
    // truncate: any append that beat the lock is in the snapshot, any
    // append after it lands behind it.
    {
        let mut wal = inner.wal.lock();
        let pending: Vec<Record> = {
            let tables = inner.memtables.read();
            tables
                .active
                .iter()
                .map(|(k, v)| Record::new(k, v.to_vec()))
                .collect()
        };
        wal.truncate()?;
        if !pending.is_empty() {
            wal.append_batch(&pending)?;
        }
    }

    // The segment now serves the frozen keys; drop the flushing pointer.
    inner.memtables.write().flushing = None;

    if inner.opts.merge_trigger > 0 && list_len >= inner.opts.merge_trigger {
        notify(&inner.merge_tx);
    }

    Ok(())
}
