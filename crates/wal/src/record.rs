/// Record codec: one WAL entry on disk.
///
/// ```text
/// [type: u8][key_len: varint][value_len: varint][key][value][crc32: u32 LE]
/// ```
///
/// The CRC32 (IEEE) covers every byte from `type` through the end of `value`.
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::varint::{decode_varint, encode_varint, varint_len, VarintError, MAX_VARINT_LEN};
use crate::WalError;

/// Size of the trailing checksum.
pub const CHECKSUM_LEN: usize = 4;

/// Longest possible `[type][key_len][value_len]` prefix.
pub const MAX_HEADER_LEN: usize = 1 + 2 * MAX_VARINT_LEN;

/// Smallest possible record: an empty key and value.
pub const MIN_RECORD_LEN: usize = 3 + CHECKSUM_LEN;

/// On-disk type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Put = 1,
    Del = 2,
}

impl RecordType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordType::Put),
            2 => Some(RecordType::Del),
            _ => None,
        }
    }
}

/// A single WAL record: a key-value insertion or a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion (or overwrite).
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// A key deletion. Encoded with a zero-length value.
    Del { key: Vec<u8> },
}

impl WalRecord {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        WalRecord::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<Vec<u8>>) -> Self {
        WalRecord::Del { key: key.into() }
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            WalRecord::Put { .. } => RecordType::Put,
            WalRecord::Del { .. } => RecordType::Del,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            WalRecord::Put { key, .. } | WalRecord::Del { key } => key,
        }
    }

    /// The value bytes; empty for a deletion.
    pub fn value(&self) -> &[u8] {
        match self {
            WalRecord::Put { value, .. } => value,
            WalRecord::Del { .. } => &[],
        }
    }

    /// Exact number of bytes [`encode_into`](Self::encode_into) appends.
    pub fn encoded_len(&self) -> usize {
        let (k, v) = (self.key().len(), self.value().len());
        1 + varint_len(k as u64) + varint_len(v as u64) + k + v + CHECKSUM_LEN
    }

    /// Appends the serialized record, checksum included, to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        let (key, value) = (self.key(), self.value());

        buf.reserve(self.encoded_len());
        buf.push(self.record_type() as u8);
        encode_varint(key.len() as u64, buf);
        encode_varint(value.len() as u64, buf);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);

        let mut hasher = Crc32::new();
        hasher.update(&buf[start..]);
        buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    }
}

/// Decoded `[type][key_len][value_len]` prefix of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub kind: RecordType,
    pub key_len: u64,
    pub value_len: u64,
    /// Bytes occupied by the header itself.
    pub len: usize,
}

impl Header {
    /// Total record length (header, payload and checksum), or `None` if it
    /// does not fit in a `u64`.
    pub fn record_len(&self) -> Option<u64> {
        (self.len as u64)
            .checked_add(self.key_len)?
            .checked_add(self.value_len)?
            .checked_add(CHECKSUM_LEN as u64)
    }
}

/// Decodes a header from the front of `buf`. `offset` is only used for error
/// reporting.
pub(crate) fn decode_header(buf: &[u8], offset: u64) -> Result<Header, WalError> {
    let type_byte = *buf.first().ok_or(WalError::Truncated { offset })?;
    let kind = RecordType::from_byte(type_byte).ok_or_else(|| WalError::InvalidRecord {
        offset,
        reason: format!("unknown record type {}", type_byte),
    })?;

    let varint = |at: usize| {
        decode_varint(&buf[at..]).map_err(|e| match e {
            VarintError::Truncated => WalError::Truncated { offset },
            VarintError::Overflow => WalError::InvalidRecord {
                offset,
                reason: "varint overflows 64 bits".to_string(),
            },
        })
    };

    let (key_len, n1) = varint(1)?;
    let (value_len, n2) = varint(1 + n1)?;

    Ok(Header {
        kind,
        key_len,
        value_len,
        len: 1 + n1 + n2,
    })
}

/// Returns the `(stored, computed)` checksums of a span whose last
/// [`CHECKSUM_LEN`] bytes hold the stored CRC.
pub(crate) fn checksums(buf: &[u8]) -> (u32, u32) {
    let split = buf.len() - CHECKSUM_LEN;
    let stored = LittleEndian::read_u32(&buf[split..]);

    let mut hasher = Crc32::new();
    hasher.update(&buf[..split]);
    (stored, hasher.finalize())
}

/// Checks the trailing checksum of a complete record held in `buf`.
pub(crate) fn verify_checksum(buf: &[u8], offset: u64) -> Result<(), WalError> {
    let (stored, computed) = checksums(buf);
    if stored != computed {
        return Err(WalError::InvalidChecksum {
            offset,
            stored,
            computed,
        });
    }
    Ok(())
}

/// Builds a record from a verified buffer and its header.
pub(crate) fn decode_body(buf: &[u8], header: &Header) -> WalRecord {
    let key_end = header.len + header.key_len as usize;
    let value_end = key_end + header.value_len as usize;
    let key = buf[header.len..key_end].to_vec();
    match header.kind {
        RecordType::Put => WalRecord::Put {
            key,
            value: buf[key_end..value_end].to_vec(),
        },
        RecordType::Del => WalRecord::Del { key },
    }
}

/// Whether `buf` starts with a complete record whose checksum matches.
pub(crate) fn starts_with_valid_record(buf: &[u8]) -> bool {
    let header = match decode_header(buf, 0) {
        Ok(header) => header,
        Err(_) => return false,
    };
    match header.record_len() {
        Some(len) if len <= buf.len() as u64 => verify_checksum(&buf[..len as usize], 0).is_ok(),
        _ => false,
    }
}
