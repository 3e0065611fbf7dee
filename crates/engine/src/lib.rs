//! # Engine - the EddyKV storage engine
//!
//! The central orchestrator tying the [`memtable`], [`wal`] and [`sstable`]
//! crates into an embedded LSM key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller threads                      Background workers
//!   |                                   ┌──────────────┐
//!   | set() ──> memtable ──> WAL fsync  │ flush worker │ freeze memtable,
//!   |              |                    │              │ write segment,
//!   |              | (size > threshold) │  mailbox(1)  │ publish, reset WAL
//!   |              └── try_send ──────> └──────┬───────┘
//!   |                                          | (list >= trigger)
//!   | get() ──> active ──> flushing     ┌──────▼───────┐
//!   |           ──> segments            │ merge worker │ k-way merge the
//!   |               (newest first)      │  mailbox(1)  │ two oldest, retire
//!   |                                   └──────────────┘ the sources
//! ```
//!
//! ## Concurrency model
//!
//! - The two memtable pointers (`active`, `flushing`) share one `RwLock`;
//!   writers take it for the memtable insert only, readers for the probe
//!   only.
//! - The segment list is an immutable snapshot behind an `Arc`; readers
//!   clone the `Arc` and probe without further locking. Publishers (flush,
//!   merge) serialize their read-modify-swap under a dedicated publish
//!   mutex.
//! - The WAL handle has its own mutex; appends and the post-flush reset
//!   are the only writers.
//! - Each worker is a single thread driven by a bounded(1) mailbox.
//!   Notifications use `try_send` and are dropped when the mailbox is
//!   full, so a busy worker coalesces any number of wakeups into one
//!   pending unit of work and writers never block on it.
//!
//! ## Module responsibilities
//!
//! | Module         | Purpose                                         |
//! |----------------|-------------------------------------------------|
//! | `lib.rs`       | `Db`/`Options`, open/close, worker supervision  |
//! | `write.rs`     | `set()`, key validation, flush notification     |
//! | `read.rs`      | `get()` across memtables and segments           |
//! | `flush.rs`     | flush worker: freeze, serialize, publish, reset |
//! | `compaction.rs`| merge worker: k-way merge the two oldest        |
//! | `recovery.rs`  | WAL replay, segment discovery, orphan GC        |

mod compaction;
mod error;
mod flush;
mod read;
mod recovery;
mod write;

pub use error::{DbError, Result};

use crossbeam::channel::{bounded, Receiver, Sender};
use memtable::Memtable;
use parking_lot::{Mutex, RwLock};
use sstable::{Segment, SegmentWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Default memtable size threshold that triggers a flush: 4 MiB.
pub const DEFAULT_MAX_MEMTABLE_SIZE: usize = 4 * 1024 * 1024;

/// Default number of segments that triggers a background merge.
pub const DEFAULT_MERGE_TRIGGER: usize = 4;

/// Database settings, builder style.
///
/// ```no_run
/// use engine::{Db, Options};
///
/// let db = Db::open("./data", Options::new().max_memtable_size(64 * 1024)).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) max_memtable_size: usize,
    pub(crate) merge_trigger: usize,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Memtable byte-size estimate above which a flush is scheduled.
    pub fn max_memtable_size(mut self, bytes: usize) -> Self {
        self.max_memtable_size = bytes;
        self
    }

    /// Segment count at which a flush also schedules a merge of the two
    /// oldest segments. `0` disables automatic merging.
    pub fn merge_trigger(mut self, segments: usize) -> Self {
        self.merge_trigger = segments;
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_memtable_size: DEFAULT_MAX_MEMTABLE_SIZE,
            merge_trigger: DEFAULT_MERGE_TRIGGER,
        }
    }
}

/// Immutable snapshot of the segment list, newest segment first.
pub(crate) type SegmentList = Arc<Vec<Arc<Segment>>>;

/// The two memtable pointers guarded by one `RwLock`.
#[derive(Default)]
pub(crate) struct Memtables {
    /// Sole write target.
    pub(crate) active: Memtable,
    /// Set only between the start and end of a flush; readers probe it
    /// after `active` so a key stays visible for the whole flush.
    pub(crate) flushing: Option<Arc<Memtable>>,
}

/// Mailbox message for the background workers.
pub(crate) enum WorkerMsg {
    /// Do one unit of work. `ack` is present for the synchronous
    /// `Db::flush`/`Db::merge` paths and reports completion or failure.
    Notify {
        ack: Option<Sender<std::result::Result<(), String>>>,
    },
    /// Finish the current unit of work, then exit.
    Shutdown,
}

/// Tryput-or-drop notification: with a bounded(1) mailbox, any number of
/// wakeups fired at a busy worker leave at most one queued.
pub(crate) fn notify(tx: &Sender<WorkerMsg>) {
    if tx.try_send(WorkerMsg::Notify { ack: None }).is_err() {
        tracing::debug!("worker busy, notification coalesced");
    }
}

pub(crate) struct DbInner {
    pub(crate) dir: PathBuf,
    pub(crate) opts: Options,

    pub(crate) memtables: RwLock<Memtables>,
    pub(crate) wal: Mutex<wal::WalWriter>,

    /// Current snapshot; swapped whole, never mutated in place.
    pub(crate) segments: RwLock<SegmentList>,
    /// Serializes publishers' read-modify-swap of the snapshot.
    pub(crate) publish_lock: Mutex<()>,

    /// Next segment number to hand out.
    pub(crate) next_segment: AtomicU64,

    pub(crate) closed: AtomicBool,
    /// First fatal worker error; handed to the caller on `close`.
    pub(crate) fatal: Mutex<Option<DbError>>,

    pub(crate) flush_tx: Sender<WorkerMsg>,
    pub(crate) merge_tx: Sender<WorkerMsg>,
}

impl DbInner {
    pub(crate) fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DbError::Closed);
        }
        Ok(())
    }

    pub(crate) fn segment_snapshot(&self) -> SegmentList {
        self.segments.read().clone()
    }

    pub(crate) fn record_fatal(&self, err: DbError) {
        let mut slot = self.fatal.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_fatal(&self) -> DbError {
        self.fatal
            .lock()
            .take()
            .unwrap_or_else(|| DbError::Worker("background worker terminated".into()))
    }
}

/// An open EddyKV database.
///
/// All methods take `&self`; wrap the handle in an `Arc` to share it across
/// threads. Dropping the handle closes it best-effort; call
/// [`close`](Db::close) to observe shutdown errors.
pub struct Db {
    inner: Arc<DbInner>,
    flush_handle: Mutex<Option<JoinHandle<()>>>,
    merge_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Db {
    /// Opens a database directory, creating it if needed.
    ///
    /// Recovery happens here, in order: stale `.tmp` files from
    /// interrupted flushes/merges are deleted, segments subsumed by a
    /// published merge are garbage-collected, a non-empty WAL is replayed
    /// and its contents persisted to a fresh segment, the WAL is truncated,
    /// the surviving segments are opened newest-first, and the two
    /// background workers are started.
    pub fn open<P: AsRef<Path>>(path: P, opts: Options) -> Result<Db> {
        let dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        recovery::remove_stale_tmp_files(&dir);
        recovery::remove_subsumed_segments(&dir)?;

        let (mut segments, mut next_segment) = recovery::load_segments(&dir)?;

        let wal_path = dir.join(recovery::WAL_FILE);
        let recovered = recovery::replay_wal(&wal_path)?;
        let mut wal = wal::WalWriter::create(&wal_path)?;

        if !recovered.is_empty() {
            // Records in the WAL were acknowledged; put them on disk in a
            // segment before dropping their WAL coverage so a crash right
            // after open cannot lose them.
            let name = recovery::segment_file_name(next_segment, 0);
            next_segment += 1;
            let seg = SegmentWriter::write_memtable(&dir.join(name), &recovered)?;
            tracing::info!(records = seg.len(), "recovered write-ahead log into a segment");
            segments.insert(0, Arc::new(seg));
        }
        wal.truncate()?;

        let (flush_tx, flush_rx) = bounded::<WorkerMsg>(1);
        let (merge_tx, merge_rx) = bounded::<WorkerMsg>(1);

        let inner = Arc::new(DbInner {
            dir,
            opts,
            memtables: RwLock::new(Memtables::default()),
            wal: Mutex::new(wal),
            segments: RwLock::new(Arc::new(segments)),
            publish_lock: Mutex::new(()),
            next_segment: AtomicU64::new(next_segment),
            closed: AtomicBool::new(false),
            fatal: Mutex::new(None),
            flush_tx,
            merge_tx,
        });

        let flush_handle = spawn_worker("eddykv-flush", &inner, flush_rx, flush::run)?;
        let merge_handle = spawn_worker("eddykv-merge", &inner, merge_rx, compaction::run)?;

        Ok(Db {
            inner,
            flush_handle: Mutex::new(Some(flush_handle)),
            merge_handle: Mutex::new(Some(merge_handle)),
        })
    }

    /// Schedules a flush of the active memtable and waits for it to
    /// complete. A no-op when the memtable is empty.
    pub fn flush(&self) -> Result<()> {
        self.inner.check_open()?;
        self.request(&self.inner.flush_tx)
    }

    /// Schedules a merge of the two oldest segments and waits for it to
    /// complete. A no-op with fewer than two segments.
    pub fn merge(&self) -> Result<()> {
        self.inner.check_open()?;
        self.request(&self.inner.merge_tx)
    }

    fn request(&self, tx: &Sender<WorkerMsg>) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        tx.send(WorkerMsg::Notify { ack: Some(ack_tx) })
            .map_err(|_| self.inner.take_fatal())?;
        match ack_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(DbError::Worker(msg)),
            Err(_) => Err(self.inner.take_fatal()),
        }
    }

    /// Flushes outstanding writes and shuts the workers down. Idempotent;
    /// a shutting-down database refuses new `set`/`get` calls.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // One final flush, then cancellation. The mailbox is FIFO, so the
        // worker is guaranteed to see the flush before the shutdown; sends
        // fail only if the worker already died, which `fatal` reports.
        let _ = self.inner.flush_tx.send(WorkerMsg::Notify { ack: None });
        let _ = self.inner.flush_tx.send(WorkerMsg::Shutdown);
        let _ = self.inner.merge_tx.send(WorkerMsg::Shutdown);

        if let Some(handle) = self.flush_handle.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.merge_handle.lock().take() {
            let _ = handle.join();
        }

        if let Some(err) = self.inner.fatal.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    /// Number of segments currently in the list.
    pub fn segment_count(&self) -> usize {
        self.inner.segments.read().len()
    }

    /// Current byte-size estimate of the active memtable.
    pub fn memtable_size(&self) -> usize {
        self.inner.memtables.read().active.size()
    }
}

fn spawn_worker(
    name: &str,
    inner: &Arc<DbInner>,
    rx: Receiver<WorkerMsg>,
    run: fn(Arc<DbInner>, Receiver<WorkerMsg>),
) -> Result<JoinHandle<()>> {
    let inner = Arc::clone(inner);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(inner, rx))?;
    Ok(handle)
}

/// Best-effort close on drop; the final flush keeps acknowledged writes
/// out of a WAL-replay-only recovery. Errors are swallowed because `Drop`
/// cannot propagate them; call [`Db::close`] to observe them.
impl Drop for Db {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests;
