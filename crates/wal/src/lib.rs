//! # WAL — Write-Ahead Log
//!
//! Provides crash-safe durability for the QuillKV memtable.
//!
//! Every mutation (`PUT` or `DELETE`) is serialized into a binary record and
//! appended to the WAL **before** the corresponding in-memory update. On
//! restart the WAL is replayed from offset 0 to reconstruct the memtable.
//!
//! ## Binary Record Format
//!
//! ```text
//! [type: u8][key_len: varint][value_len: varint][key][value][crc32: u32 LE]
//! ```
//!
//! `type` is `1` for Put and `2` for Delete (whose value is always empty).
//! Lengths are unsigned LEB128 varints. The CRC32 (IEEE) covers every byte
//! from `type` through the end of `value`. A WAL file is a flat concatenation
//! of records; there is no header, footer or version marker.
//!
//! ## Concurrency
//!
//! A [`Wal`] is shared by reference: `write`, `write_batch`, `truncate` and
//! `close` serialize on one internal mutex, and each record (or batch) is
//! written with a single `write_all` on an append-mode handle. Opening an
//! iterator takes the lock only to snapshot the current size; the iterator
//! then reads through its own handle without blocking writers.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{Wal, WalRecord};
//!
//! let wal = Wal::open("wal.log", true).unwrap();
//! wal.write(&WalRecord::put(b"hello".to_vec(), b"world".to_vec())).unwrap();
//! wal.write_batch(&[WalRecord::del(b"hello".to_vec())]).unwrap();
//!
//! let mut it = wal.new_iterator().unwrap();
//! while let Some(rec) = it.next_record().unwrap() {
//!     println!("{:?}", rec);
//! }
//! ```

mod iterator;
mod record;
pub mod varint;

pub use iterator::WalIterator;
pub use record::{RecordType, WalRecord, CHECKSUM_LEN, MAX_HEADER_LEN, MIN_RECORD_LEN};

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The stored CRC32 does not match the record bytes: on-disk corruption
    /// or a torn write.
    #[error("invalid checksum at offset {offset}: stored {stored:#010x}, computed {computed:#010x}")]
    InvalidChecksum {
        offset: u64,
        stored: u32,
        computed: u32,
    },

    /// Unknown type byte or an undecodable length: format corruption, or not
    /// a WAL file at all.
    #[error("invalid record at offset {offset}: {reason}")]
    InvalidRecord { offset: u64, reason: String },

    /// The log ends inside the record and nothing valid follows it (a
    /// partially written tail).
    #[error("truncated record at offset {offset}")]
    Truncated { offset: u64 },

    /// The WAL has been closed.
    #[error("wal is closed")]
    Closed,
}

impl WalError {
    /// Whether this error describes bad bytes in the log rather than a failure
    /// to access it.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            WalError::InvalidChecksum { .. }
                | WalError::InvalidRecord { .. }
                | WalError::Truncated { .. }
        )
    }

    /// The log offset of the offending record, for decode errors.
    pub fn offset(&self) -> Option<u64> {
        match self {
            WalError::InvalidChecksum { offset, .. }
            | WalError::InvalidRecord { offset, .. }
            | WalError::Truncated { offset } => Some(*offset),
            WalError::Io(_) | WalError::Closed => None,
        }
    }
}

/// State guarded by the WAL mutex.
struct WalFile {
    /// `None` once closed.
    file: Option<File>,
    /// Bytes of complete records in the log.
    size: u64,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

/// Append-only write-ahead log.
///
/// When `sync` is `true`, every `write` / `write_batch` is followed by
/// `sync_all()` (fsync) so the records are durable before the call returns.
pub struct Wal {
    path: PathBuf,
    sync: bool,
    inner: Mutex<WalFile>,
}

impl Wal {
    /// Opens (or creates) a WAL file for appending.
    ///
    /// # Arguments
    ///
    /// * `path` - file system path for the WAL (created if it does not exist).
    /// * `sync` - if true, every write is followed by `fsync`.
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        log::debug!("opened wal {} ({} bytes, sync={})", path.display(), size, sync);

        Ok(Self {
            path,
            sync,
            inner: Mutex::new(WalFile {
                file: Some(file),
                size,
                buf: Vec::with_capacity(256),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether every write is followed by an fsync.
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Current logical size in bytes.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().file.is_none()
    }

    /// Serializes `record` and appends it to the log.
    ///
    /// On failure the logical size is unchanged and the file is cut back to
    /// it, so a failed write never leaves a record a later replay could read.
    pub fn write(&self, record: &WalRecord) -> Result<(), WalError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.buf.clear();
        record.encode_into(&mut inner.buf);
        Self::append(inner, self.sync)
    }

    /// Appends all `records` with a single write call and at most one fsync.
    ///
    /// Each record keeps its own checksum, so replay verifies them
    /// independently. An empty batch is a no-op.
    pub fn write_batch(&self, records: &[WalRecord]) -> Result<(), WalError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.buf.clear();
        inner
            .buf
            .reserve(records.iter().map(WalRecord::encoded_len).sum());
        for record in records {
            record.encode_into(&mut inner.buf);
        }
        Self::append(inner, self.sync)?;
        log::debug!(
            "wal batch of {} records ({} bytes)",
            records.len(),
            inner.buf.len()
        );
        Ok(())
    }

    /// Writes `inner.buf` in one call, then optionally syncs.
    fn append(inner: &mut WalFile, sync: bool) -> Result<(), WalError> {
        let file = inner.file.as_mut().ok_or(WalError::Closed)?;

        let mut result = file.write_all(&inner.buf);
        if result.is_ok() && sync {
            result = file.sync_all();
        }

        match result {
            Ok(()) => {
                inner.size += inner.buf.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = file.set_len(inner.size) {
                    log::warn!(
                        "failed to roll wal back to {} bytes after write error: {}",
                        inner.size,
                        rollback
                    );
                }
                Err(WalError::Io(e))
            }
        }
    }

    /// Forces all written data to disk via `sync_all()`.
    ///
    /// Useful when `sync` is `false` and the caller wants durability at a
    /// specific point.
    pub fn sync_to_disk(&self) -> Result<(), WalError> {
        let mut guard = self.inner.lock();
        let file = guard.file.as_mut().ok_or(WalError::Closed)?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    /// Opens an iterator over the records present right now.
    ///
    /// The iterator reads through an independent handle and stops at the size
    /// snapshotted here; later writes are invisible to it.
    pub fn new_iterator(&self) -> Result<WalIterator, WalError> {
        let guard = self.inner.lock();
        if guard.file.is_none() {
            return Err(WalError::Closed);
        }
        WalIterator::open(&self.path, guard.size)
    }

    /// Replays every record from offset 0, calling `apply` for each one.
    ///
    /// Returns the number of records applied. Any decode or I/O error is
    /// returned as-is; records before it have already been applied.
    pub fn replay<F>(&self, mut apply: F) -> Result<usize, WalError>
    where
        F: FnMut(WalRecord),
    {
        let mut it = self.new_iterator()?;
        let mut applied = 0;
        while let Some(record) = it.next_record()? {
            apply(record);
            applied += 1;
        }
        Ok(applied)
    }

    /// Discards the whole log: zero length, zero logical size.
    ///
    /// Called once the log's contents are durable elsewhere.
    pub fn truncate(&self) -> Result<(), WalError> {
        self.truncate_to(0)
    }

    /// Cuts the log back to its first `len` bytes, which must end on a record
    /// boundary. Used by recovery to drop a torn or corrupt tail so that new
    /// appends stay reachable by replay.
    pub fn truncate_to(&self, len: u64) -> Result<(), WalError> {
        let mut guard = self.inner.lock();
        let len = len.min(guard.size);
        let file = guard.file.as_mut().ok_or(WalError::Closed)?;
        file.set_len(len)?;
        if self.sync {
            file.sync_all()?;
        }
        guard.size = len;
        log::debug!("truncated wal {} to {} bytes", self.path.display(), len);
        Ok(())
    }

    /// Moves the bytes from `from` to the end of the log into a new side file
    /// next to it, then cuts the log back to `from`. Returns the side file's
    /// path: `<path>.corrupt`, or `<path>.corrupt.N` if that name is taken.
    ///
    /// The log is only cut once the side file has been fully written and
    /// synced; on any error the log is left as it was.
    pub fn quarantine_tail(&self, from: u64) -> Result<PathBuf, WalError> {
        let mut guard = self.inner.lock();
        if guard.file.is_none() {
            return Err(WalError::Closed);
        }
        let from = from.min(guard.size);
        let len = guard.size - from;

        let (side_path, mut side) = self.create_side_file()?;
        let mut src = File::open(&self.path)?;
        src.seek(SeekFrom::Start(from))?;
        let copied = io::copy(&mut src.take(len), &mut side)?;
        if copied != len {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {} of {} bytes to {}", copied, len, side_path.display()),
            )));
        }
        side.sync_all()?;

        let file = guard.file.as_mut().ok_or(WalError::Closed)?;
        file.set_len(from)?;
        if self.sync {
            file.sync_all()?;
        }
        guard.size = from;
        log::debug!(
            "moved {} bytes of wal {} from offset {} to {}",
            len,
            self.path.display(),
            from,
            side_path.display()
        );
        Ok(side_path)
    }

    fn create_side_file(&self) -> Result<(PathBuf, File), WalError> {
        let mut n = 0u32;
        loop {
            let mut name = self.path.as_os_str().to_owned();
            name.push(".corrupt");
            if n > 0 {
                name.push(format!(".{}", n));
            }
            let candidate = PathBuf::from(name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(WalError::Io(e)),
            }
        }
    }

    /// Releases the file handle. Later writes fail with [`WalError::Closed`];
    /// closing twice is a no-op.
    pub fn close(&self) -> Result<(), WalError> {
        let mut guard = self.inner.lock();
        if guard.file.take().is_some() {
            log::debug!("closed wal {}", self.path.display());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("Wal")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .field("size", &guard.size)
            .field("closed", &guard.file.is_none())
            .finish()
    }
}
