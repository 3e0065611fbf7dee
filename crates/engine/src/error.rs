use record::RecordError;
use sstable::SegmentError;
use thiserror::Error;
use wal::WalError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors surfaced by the database facade.
///
/// `KeyNotFound` is the only locally recoverable variant; callers should
/// treat anything else as potentially fatal to the session (restart and
/// recover from the WAL).
#[derive(Debug, Error)]
pub enum DbError {
    /// Lookup miss. Surfaced to the caller, never logged.
    #[error("key not found")]
    KeyNotFound,

    /// The key was rejected before it reached the write path.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The database has been closed (or is shutting down).
    #[error("database is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    /// A background worker failed; the session must be restarted.
    #[error("background worker failed: {0}")]
    Worker(String),
}
