//! Merge worker: compact the two oldest segments into one.
//!
//! A single long-running thread, woken by the flush worker when the
//! segment list reaches the configured trigger (or synchronously through
//! `Db::merge`). The k-way merge itself lives in the `sstable` crate; this
//! module picks the sources, names the output, publishes the new list and
//! retires the source files.
//!
//! Unlike a flush, a failed merge before publication is recoverable: the
//! partial output is discarded, the sources stay in place, and the worker
//! lives on to try again. Failures while deleting retired sources only
//! leave orphan files, which the next open garbage-collects.

use crossbeam::channel::Receiver;
use sstable::{merge_streams, Segment, SegmentStream, SegmentWriter};
use std::sync::Arc;

use crate::{recovery, DbError, DbInner, Result, WorkerMsg};

pub(crate) fn run(inner: Arc<DbInner>, rx: Receiver<WorkerMsg>) {
    for msg in rx.iter() {
        match msg {
            WorkerMsg::Notify { ack } => {
                let result = merge_once(&inner);
                if let Err(err) = &result {
                    tracing::error!(error = %err, "merge failed, sources left intact");
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result.map_err(|e| e.to_string()));
                }
            }
            WorkerMsg::Shutdown => return,
        }
    }
}

/// One merge cycle over the two oldest segments. A no-op when fewer than
/// two segments exist.
fn merge_once(inner: &DbInner) -> Result<()> {
    let snapshot = inner.segment_snapshot();
    if snapshot.len() < 2 {
        return Ok(());
    }

    // The list is newest-first; the sources are its tail. Stream order
    // must be oldest-first so that the larger stream index wins a key tie.
    let oldest = Arc::clone(&snapshot[snapshot.len() - 1]);
    let newer = Arc::clone(&snapshot[snapshot.len() - 2]);

    // Open the sources before creating the output so an open failure
    // cannot leave a partial file behind.
    let streams = vec![
        SegmentStream::open(oldest.path())?,
        SegmentStream::open(newer.path())?,
    ];

    let out_path = inner.dir.join(merged_name(&newer)?);
    let mut writer = SegmentWriter::create(&out_path)?;
    if let Err(err) = merge_streams(streams, &mut writer) {
        writer.abort();
        return Err(err.into());
    }
    let merged = writer.finish()?;
    tracing::info!(
        segment = %out_path.display(),
        records = merged.len(),
        "segments merged"
    );

    // Publish: drop the two sources, put the merged segment where the
    // oldest one sat. Flushes only prepend, so the sources are still the
    // tail of whatever the list looks like now.
    {
        let _publish = inner.publish_lock.lock();
        let current = inner.segment_snapshot();
        let mut next: Vec<Arc<Segment>> = current
            .iter()
            .filter(|s| !Arc::ptr_eq(s, &oldest) && !Arc::ptr_eq(s, &newer))
            .cloned()
            .collect();
        next.push(Arc::new(merged));
        *inner.segments.write() = Arc::new(next);
    }

    // Retire the sources. Readers holding the old snapshot keep valid
    // handles; a failed unlink merely leaves an orphan for open-time GC.
    for source in [&oldest, &newer] {
        if let Err(err) = std::fs::remove_file(source.path()) {
            tracing::warn!(
                segment = %source.path().display(),
                error = %err,
                "failed to delete merged source segment"
            );
        }
    }

    Ok(())
}

/// Output name for a merge: the newest source's number, one revision up.
/// That makes the merged file sort exactly where its sources sat.
fn merged_name(newest_source: &Segment) -> Result<String> {
    let name = newest_source
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let (number, rev) = recovery::parse_segment_name(name).ok_or_else(|| {
        DbError::Worker(format!("unparseable segment name in list: {:?}", name))
    })?;
    Ok(recovery::segment_file_name(number, rev + 1))
}
