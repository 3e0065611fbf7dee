//! # Record - the shared on-disk record codec
//!
//! One record is the unit persisted in both the WAL and segment files.
//! Everything that touches disk in EddyKV speaks this framing:
//!
//! ```text
//! [len: u32 LE][key bytes][0x00][value bytes]
//! ```
//!
//! `len` is the length of the **whole** record, length prefix included:
//! `4 + key.len() + 1 + value.len()`. The `0x00` byte separates key from
//! value, so keys must not contain it; the engine rejects such keys before
//! they reach this codec, and [`decode`] splits at the *first* `0x00` it
//! finds.
//!
//! The maximum record size is `u32::MAX` bytes. Values may be empty; an
//! empty value encodes as nothing after the separator.

use byteorder::{LittleEndian, WriteBytesExt};
use std::cmp::Ordering;
use std::io::{self, Write};
use thiserror::Error;

/// Number of bytes in the little-endian length prefix.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Byte separating the key from the value inside a record.
pub const KEY_VALUE_SEPARATOR: u8 = 0x00;

/// Smallest legal frame: prefix + one key byte + separator (empty value).
pub const MIN_RECORD_BYTES: usize = LENGTH_PREFIX_BYTES + 2;

/// Errors produced while encoding or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying I/O error from the output sink.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The buffer is shorter than the smallest legal record frame.
    #[error("record truncated: {0} bytes is below the minimum frame")]
    Truncated(usize),

    /// No `0x00` separator between key and value.
    #[error("record is missing the key/value separator")]
    MissingSeparator,

    /// The key bytes are not valid UTF-8.
    #[error("record key is not valid UTF-8")]
    InvalidKey,

    /// Key plus value would not fit the u32 length frame.
    #[error("record of {0} bytes exceeds the u32 length frame")]
    TooLarge(u64),
}

/// A key-value pair flowing through the engine.
///
/// `order` is a transient stream identifier used only as a tiebreaker while
/// k-way merging segments: records with equal keys compare by `order`, and
/// the merger relies on a larger `order` meaning a newer stream. It is never
/// written to disk; decoded records carry `order == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub value: Vec<u8>,
    pub order: usize,
}

impl Record {
    /// Creates a record with `order == 0`.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            order: 0,
        }
    }

    /// Total encoded size of this record, length prefix included.
    pub fn encoded_len(&self) -> Result<u32, RecordError> {
        let len = LENGTH_PREFIX_BYTES as u64 + self.key.len() as u64 + 1 + self.value.len() as u64;
        u32::try_from(len).map_err(|_| RecordError::TooLarge(len))
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    /// Merge priority: ascending key, ties broken by ascending `order`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.order.cmp(&other.order))
    }
}

/// Writes one record to `out` in a single pass: length prefix, key,
/// separator, value.
pub fn encode<W: Write>(out: &mut W, rec: &Record) -> Result<(), RecordError> {
    let len = rec.encoded_len()?;
    out.write_u32::<LittleEndian>(len)?;
    out.write_all(rec.key.as_bytes())?;
    out.write_all(&[KEY_VALUE_SEPARATOR])?;
    out.write_all(&rec.value)?;
    Ok(())
}

/// Decodes a record from `buf`, which must start at the length prefix and
/// span the whole record.
///
/// The length prefix itself is skipped, not re-validated: callers read
/// exactly as many bytes as the prefix told them to.
pub fn decode(buf: &[u8]) -> Result<Record, RecordError> {
    if buf.len() < MIN_RECORD_BYTES {
        return Err(RecordError::Truncated(buf.len()));
    }

    let body = &buf[LENGTH_PREFIX_BYTES..];
    let sep = body
        .iter()
        .position(|&b| b == KEY_VALUE_SEPARATOR)
        .ok_or(RecordError::MissingSeparator)?;

    let key = std::str::from_utf8(&body[..sep])
        .map_err(|_| RecordError::InvalidKey)?
        .to_string();

    Ok(Record {
        key,
        value: body[sep + 1..].to_vec(),
        order: 0,
    })
}

#[cfg(test)]
mod tests;
