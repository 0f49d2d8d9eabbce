//! # Memtable - WAL-backed In-Memory Write Buffer
//!
//! Composes a [`wal::Wal`] with a [`skiplist::SkipList`] keyed by raw bytes.
//!
//! ## Write Path
//!
//! ```text
//! put / delete
//!     |
//!     v
//! WAL write (durability barrier) ──error──► returned as-is, index untouched
//!     |
//!     v
//! skip list insert / remove (visibility)
//! ```
//!
//! ## Recovery
//!
//! [`Memtable::open`] replays the WAL from offset 0 into a fresh skip list, so
//! the index always equals the net effect of the logged writes. Replay stops
//! at the end of the log or at the first undecodable record, keeping the
//! valid prefix. What happens to the rest depends on why replay stopped:
//!
//! - a torn tail (the log ends inside a record that was never acknowledged)
//!   is cut off;
//! - corrupt bytes are moved to a side file next to the log (see
//!   [`wal::Wal::quarantine_tail`]) and only then cut, so nothing that was on
//!   disk is lost and new appends stay reachable by replay.
//!
//! The outcome is reported through [`Memtable::recovery`].
//!
//! The memtable is not internally synchronized: wrap it in a lock to share it
//! across threads.

use config::Config;
use skiplist::{BytewiseComparator, Comparator, SkipList};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use wal::{Wal, WalError, WalRecord};

/// The in-memory index type.
pub type Index = SkipList<Vec<u8>, Vec<u8>, BytewiseComparator>;

/// Why WAL replay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStop {
    /// Reached the end of the log.
    Clean,
    /// The last record was only partially written, e.g. a crash mid-append.
    TornTail { offset: u64 },
    /// A checksum mismatch or malformed record before the end of the log.
    Corrupt { offset: u64, reason: String },
}

/// Summary of the replay performed by [`Memtable::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records applied to the index.
    pub records_applied: usize,
    /// Length of the valid log prefix that was replayed.
    pub bytes_replayed: u64,
    /// Bytes removed from the end of the log after an early stop.
    pub bytes_discarded: u64,
    /// Side file holding the removed bytes, when replay stopped on corruption.
    pub quarantined: Option<PathBuf>,
    pub stop: RecoveryStop,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.stop == RecoveryStop::Clean
    }
}

/// A WAL-backed, ordered in-memory table of byte keys and values.
pub struct Memtable {
    index: Index,
    wal: Wal,
    /// Sum of key and value lengths of live entries.
    approx_size: usize,
    recovery: RecoveryReport,
}

impl Memtable {
    /// Opens (or creates) the WAL at `path` and rebuilds the index from it.
    ///
    /// # Errors
    ///
    /// Fails if the WAL cannot be opened or read. Corrupt or torn records do
    /// not fail the open; see [`Memtable::recovery`].
    pub fn open<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let wal = Wal::open(path, sync)?;
        let mut mem = Self {
            index: SkipList::new(BytewiseComparator),
            wal,
            approx_size: 0,
            recovery: RecoveryReport {
                records_applied: 0,
                bytes_replayed: 0,
                bytes_discarded: 0,
                quarantined: None,
                stop: RecoveryStop::Clean,
            },
        };
        mem.replay()?;
        Ok(mem)
    }

    /// Opens the memtable described by `config`.
    pub fn open_with(config: &Config) -> Result<Self, WalError> {
        Self::open(&config.wal_path, config.wal_sync)
    }

    fn replay(&mut self) -> Result<(), WalError> {
        let mut it = self.wal.new_iterator()?;
        let mut applied = 0usize;

        let stop = loop {
            match it.next_record() {
                Ok(Some(record)) => {
                    self.apply(record);
                    applied += 1;
                }
                Ok(None) => break RecoveryStop::Clean,
                Err(WalError::Truncated { offset }) => break RecoveryStop::TornTail { offset },
                Err(e) if e.is_corruption() => {
                    break RecoveryStop::Corrupt {
                        offset: it.offset(),
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            }
        };

        let valid = it.offset();
        let discarded = it.end() - valid;
        let mut quarantined = None;
        match &stop {
            RecoveryStop::Clean => {}
            RecoveryStop::TornTail { offset } => {
                log::warn!(
                    "wal {} ends with a torn record at offset {}; cutting {} bytes",
                    self.wal.path().display(),
                    offset,
                    discarded
                );
                self.wal.truncate_to(valid)?;
            }
            RecoveryStop::Corrupt { offset, reason } => {
                let side = self.wal.quarantine_tail(valid)?;
                log::warn!(
                    "wal {} is corrupt at offset {} ({}); moved {} bytes to {}",
                    self.wal.path().display(),
                    offset,
                    reason,
                    discarded,
                    side.display()
                );
                quarantined = Some(side);
            }
        }

        log::info!(
            "recovered {} records ({} entries) from {}",
            applied,
            self.index.len(),
            self.wal.path().display()
        );

        self.recovery = RecoveryReport {
            records_applied: applied,
            bytes_replayed: valid,
            bytes_discarded: discarded,
            quarantined,
            stop,
        };
        Ok(())
    }

    /// Applies a logged record to the index.
    fn apply(&mut self, record: WalRecord) {
        match record {
            WalRecord::Put { key, value } => {
                let added = key.len() + value.len();
                let klen = key.len();
                if let Some(old) = self.index.insert(key, value) {
                    self.approx_size = self.approx_size.saturating_sub(klen + old.len());
                }
                self.approx_size += added;
            }
            WalRecord::Del { key } => {
                if let Some(old) = self.index.remove(key.as_slice()) {
                    self.approx_size = self.approx_size.saturating_sub(key.len() + old.len());
                }
            }
        }
    }

    /// Inserts or overwrites `key`.
    ///
    /// The record is written to the WAL first; the index is only updated once
    /// that write succeeded.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), WalError> {
        let record = WalRecord::Put { key, value };
        self.wal.write(&record)?;
        self.apply(record);
        Ok(())
    }

    /// Deletes `key`. Deleting an absent key is not an error.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<(), WalError> {
        let record = WalRecord::Del { key };
        self.wal.write(&record)?;
        self.apply(record);
        Ok(())
    }

    /// Logs `records` with one WAL write (and at most one fsync), then applies
    /// them in order.
    pub fn write_batch(&mut self, records: Vec<WalRecord>) -> Result<(), WalError> {
        self.wal.write_batch(&records)?;
        for record in records {
            self.apply(record);
        }
        Ok(())
    }

    /// Point lookup.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.index.find(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.index.contains_key(key)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.index
            .iter()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    /// Entries with `start <= key < end` (no upper bound when `end` is
    /// `None`), in ascending order.
    pub fn scan(&self, start: &[u8], end: Option<&[u8]>) -> Vec<(Vec<u8>, Vec<u8>)> {
        let cmp = self.index.comparator();
        let mut cursor = self.index.cursor();
        cursor.seek(start);

        let mut out = Vec::new();
        while cursor.valid() {
            let key = cursor.key().as_slice();
            if let Some(end) = end {
                if cmp.compare(key, end) != Ordering::Less {
                    break;
                }
            }
            out.push((key.to_vec(), cursor.value().clone()));
            cursor.advance();
        }
        out
    }

    /// Read access to the underlying skip list.
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    /// Current WAL size in bytes.
    pub fn wal_size(&self) -> u64 {
        self.wal.size()
    }

    /// Outcome of the replay done when this memtable was opened.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Empties both the WAL and the index.
    ///
    /// Call only after the contents have been persisted elsewhere.
    pub fn reset(&mut self) -> Result<(), WalError> {
        self.wal.truncate()?;
        self.index.clear();
        self.approx_size = 0;
        Ok(())
    }

    /// Forces buffered WAL writes to disk.
    pub fn sync(&self) -> Result<(), WalError> {
        self.wal.sync_to_disk()
    }

    /// Closes the WAL.
    pub fn close(self) -> Result<(), WalError> {
        self.wal.close()
    }
}

impl fmt::Debug for Memtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memtable")
            .field("wal_path", &self.wal.path())
            .field("wal_sync", &self.wal.is_sync())
            .field("wal_size", &self.wal.size())
            .field("entries", &self.index.len())
            .field("approx_size", &self.approx_size)
            .field("skiplist_level", &self.index.level())
            .field("recovery", &self.recovery)
            .finish()
    }
}
