use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::record::{
    checksums, decode_body, decode_header, starts_with_valid_record, verify_checksum,
    MAX_HEADER_LEN, MIN_RECORD_LEN,
};
use crate::{WalError, WalRecord};

/// Sequential reader over a snapshot of the WAL.
///
/// The iterator owns its own read handle and is bounded by the log size at the
/// moment it was created; records appended later are never observed. A failed
/// [`next_record`](Self::next_record) does not advance, so calling it again
/// reports the same error.
pub struct WalIterator {
    reader: BufReader<File>,
    offset: u64,
    end: u64,
    /// Whether the underlying handle is known to sit at `offset`.
    positioned: bool,
    /// Set once the `Iterator` impl has yielded an error.
    failed: bool,
    buf: Vec<u8>,
}

impl WalIterator {
    pub(crate) fn open(path: &Path, end: u64) -> Result<Self, WalError> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: 0,
            end,
            positioned: false,
            failed: false,
            buf: Vec::with_capacity(256),
        })
    }

    /// Byte offset of the next record to decode.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Snapshot end: the log size when this iterator was created.
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Decodes the record at the current offset.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))` and advances past it on success.
    /// - `Ok(None)` at or past the snapshot end.
    /// - `Err(WalError::InvalidChecksum { .. })` on CRC mismatch, including a
    ///   record whose lengths run past the end while a valid record follows.
    /// - `Err(WalError::InvalidRecord { .. })` on an unknown type byte or an
    ///   overflowing length.
    /// - `Err(WalError::Truncated { .. })` if the log ends inside the record
    ///   and nothing valid follows it.
    /// - `Err(WalError::Io(..))` on read failure.
    pub fn next_record(&mut self) -> Result<Option<WalRecord>, WalError> {
        if self.offset >= self.end {
            return Ok(None);
        }
        match self.read_at_offset() {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                self.positioned = false;
                Err(e)
            }
        }
    }

    fn read_at_offset(&mut self) -> Result<WalRecord, WalError> {
        let offset = self.offset;
        if !self.positioned {
            self.reader.seek(SeekFrom::Start(offset))?;
            self.positioned = true;
        }

        let remaining = self.end - offset;
        let peek = remaining.min(MAX_HEADER_LEN as u64) as usize;
        self.buf.clear();
        self.buf.resize(peek, 0);
        self.reader.read_exact(&mut self.buf)?;

        let header = match decode_header(&self.buf, offset) {
            Err(WalError::Truncated { .. }) => return Err(self.overrun(offset)),
            other => other?,
        };
        let total = header.record_len().ok_or_else(|| WalError::InvalidRecord {
            offset,
            reason: "record length overflows".to_string(),
        })?;
        // Reject before allocating: a corrupted length must not size a buffer.
        if total > remaining {
            return Err(self.overrun(offset));
        }
        let total = total as usize;

        if total >= peek {
            self.buf.resize(total, 0);
            self.reader.read_exact(&mut self.buf[peek..])?;
        } else {
            // The peek ran into the next record; step back to its start.
            self.reader.seek_relative(-((peek - total) as i64))?;
            self.buf.truncate(total);
        }

        verify_checksum(&self.buf, offset)?;
        let record = decode_body(&self.buf, &header);
        self.offset += total as u64;
        Ok(record)
    }

    /// Classifies a record at `offset` that runs past the snapshot end.
    ///
    /// If a complete record with a matching checksum starts anywhere after
    /// it, the bytes of this record are damaged (typically a length field)
    /// and the span up to that record fails as a checksum mismatch. Otherwise
    /// the log ends inside the record: a torn tail.
    fn overrun(&mut self, offset: u64) -> WalError {
        match self.next_valid_record(offset) {
            Ok(Some(span)) => {
                let (stored, computed) = checksums(&self.buf[..span]);
                WalError::InvalidChecksum {
                    offset,
                    stored,
                    computed,
                }
            }
            Ok(None) => WalError::Truncated { offset },
            Err(e) => e,
        }
    }

    /// Loads the rest of the snapshot from `offset` into `buf` and returns the
    /// distance to the first valid record after `offset`, if any.
    fn next_valid_record(&mut self, offset: u64) -> Result<Option<usize>, WalError> {
        let remaining = (self.end - offset) as usize;
        self.reader.seek(SeekFrom::Start(offset))?;
        self.buf.clear();
        self.buf.resize(remaining, 0);
        self.reader.read_exact(&mut self.buf)?;

        let buf = &self.buf;
        Ok((MIN_RECORD_LEN..remaining).find(|&at| starts_with_valid_record(&buf[at..])))
    }
}

impl Iterator for WalIterator {
    type Item = Result<WalRecord, WalError>;

    /// Yields records until the end of the snapshot. After the first error is
    /// yielded the iterator is exhausted.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for WalIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalIterator")
            .field("offset", &self.offset)
            .field("end", &self.end)
            .finish()
    }
}
