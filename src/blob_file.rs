//! Blob file encoding and metadata.
//!
//! A blob file is an append-only sequence of records followed by a footer:
//!
//! ```text
//! +------------------+
//! |     Records      |  <- key_len (4) | value_len (4) | key | value | crc (4)
//! +------------------+
//! |  Footer (var)    |  <- entry_count, smallest/largest key
//! +------------------+
//! |   Footer crc     |  <- 4 bytes
//! +------------------+
//! |   Footer len     |  <- 4 bytes
//! +------------------+
//! |     Version      |  <- 2 bytes
//! +------------------+
//! |      Magic       |  <- 4 bytes
//! +------------------+
//! ```
//!
//! Each record's checksum covers its header and payload. Readers locate the
//! footer from the fixed 10-byte tail and then iterate records from offset 0.
//!
//! [`BlobFileBuilder`] accumulates the encoded file in memory; the encoded
//! bytes are written to the object store only when the file is published.
//! [`BlobFileMeta`] is the shared per-file metadata: identity, key range,
//! state machine, and the liveness accounting that drives future garbage
//! collection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use crate::blob_index::BlobHandle;
use crate::error::BlobDbError;
use crate::liveness::LivenessBitset;

pub(crate) const BLOB_FORMAT_VERSION: u16 = 1;
pub(crate) const BLOB_FILE_MAGIC: u32 = 0xB10B_F11E;

/// footer_len (4) + version (2) + magic (4)
pub(crate) const FOOTER_TAIL_SIZE: usize = 10;
pub(crate) const RECORD_HEADER_SIZE: usize = 8;
pub(crate) const RECORD_CHECKSUM_SIZE: usize = 4;

/// Total framed size of a record holding `key` and `value`.
pub(crate) fn record_size(key_len: usize, value_len: usize) -> u64 {
    (RECORD_HEADER_SIZE + key_len + value_len + RECORD_CHECKSUM_SIZE) as u64
}

pub(crate) fn encode_record(buf: &mut BytesMut, key: &[u8], value: &[u8]) {
    let start = buf.len();
    buf.put_u32(key.len() as u32);
    buf.put_u32(value.len() as u32);
    buf.put_slice(key);
    buf.put_slice(value);
    let checksum = crc32fast::hash(&buf[start..]);
    buf.put_u32(checksum);
}

/// Decodes one record from the head of `bytes`, which must contain the full
/// framed record. Returns the key, value, and bytes consumed.
pub(crate) fn decode_record(bytes: &Bytes) -> Result<(Bytes, Bytes, usize), BlobDbError> {
    if bytes.len() < RECORD_HEADER_SIZE + RECORD_CHECKSUM_SIZE {
        return Err(BlobDbError::InvalidBlobFile {
            msg: "truncated record header".to_string(),
        });
    }
    let mut header = &bytes[..RECORD_HEADER_SIZE];
    let key_len = header.get_u32() as usize;
    let value_len = header.get_u32() as usize;
    let total = record_size(key_len, value_len) as usize;
    if bytes.len() < total {
        return Err(BlobDbError::InvalidBlobFile {
            msg: "truncated record payload".to_string(),
        });
    }
    let checksum_offset = total - RECORD_CHECKSUM_SIZE;
    let expected = (&bytes[checksum_offset..total]).get_u32();
    if crc32fast::hash(&bytes[..checksum_offset]) != expected {
        return Err(BlobDbError::ChecksumMismatch);
    }
    let key = bytes.slice(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + key_len);
    let value = bytes.slice(RECORD_HEADER_SIZE + key_len..RECORD_HEADER_SIZE + key_len + value_len);
    Ok((key, value, total))
}

#[derive(Debug, PartialEq)]
pub(crate) struct BlobFileFooter {
    pub(crate) entry_count: u32,
    pub(crate) smallest_key: Bytes,
    pub(crate) largest_key: Bytes,
    /// Total footer length including the fixed tail.
    pub(crate) encoded_size: u64,
}

impl BlobFileFooter {
    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        let start = buf.len();
        buf.put_u32(self.entry_count);
        buf.put_u32(self.smallest_key.len() as u32);
        buf.put_slice(&self.smallest_key);
        buf.put_u32(self.largest_key.len() as u32);
        buf.put_slice(&self.largest_key);
        let checksum = crc32fast::hash(&buf[start..]);
        buf.put_u32(checksum);
        let footer_len = (buf.len() - start) as u32;
        buf.put_u32(footer_len);
        buf.put_u16(BLOB_FORMAT_VERSION);
        buf.put_u32(BLOB_FILE_MAGIC);
    }

    /// Decodes the fixed tail, returning the length of the variable footer
    /// part (entry count, key range, checksum) that precedes it.
    pub(crate) fn decode_tail(tail: &[u8]) -> Result<usize, BlobDbError> {
        if tail.len() != FOOTER_TAIL_SIZE {
            return Err(BlobDbError::InvalidBlobFile {
                msg: "truncated footer tail".to_string(),
            });
        }
        let mut buf = tail;
        let footer_len = buf.get_u32() as usize;
        let version = buf.get_u16();
        let magic = buf.get_u32();
        if magic != BLOB_FILE_MAGIC {
            return Err(BlobDbError::InvalidBlobFile {
                msg: "bad magic".to_string(),
            });
        }
        if version != BLOB_FORMAT_VERSION {
            return Err(BlobDbError::InvalidBlobFile {
                msg: format!("unsupported version {}", version),
            });
        }
        Ok(footer_len)
    }

    /// Decodes the variable footer part previously measured by
    /// [`BlobFileFooter::decode_tail`].
    pub(crate) fn decode(bytes: &Bytes) -> Result<Self, BlobDbError> {
        if bytes.len() < 4 + RECORD_CHECKSUM_SIZE {
            return Err(BlobDbError::InvalidBlobFile {
                msg: "truncated footer".to_string(),
            });
        }
        let checksum_offset = bytes.len() - RECORD_CHECKSUM_SIZE;
        let expected = (&bytes[checksum_offset..]).get_u32();
        if crc32fast::hash(&bytes[..checksum_offset]) != expected {
            return Err(BlobDbError::ChecksumMismatch);
        }
        let mut buf = bytes.slice(..checksum_offset);
        let entry_count = buf.get_u32();
        let smallest_len = buf.get_u32() as usize;
        if buf.remaining() < smallest_len + 4 {
            return Err(BlobDbError::InvalidBlobFile {
                msg: "truncated footer key range".to_string(),
            });
        }
        let smallest_key = buf.copy_to_bytes(smallest_len);
        let largest_len = buf.get_u32() as usize;
        if buf.remaining() != largest_len {
            return Err(BlobDbError::InvalidBlobFile {
                msg: "truncated footer key range".to_string(),
            });
        }
        let largest_key = buf.copy_to_bytes(largest_len);
        Ok(Self {
            entry_count,
            smallest_key,
            largest_key,
            encoded_size: (bytes.len() + FOOTER_TAIL_SIZE) as u64,
        })
    }
}

/// A fully-encoded blob file, ready to be written to the object store.
pub struct EncodedBlobFile {
    pub(crate) file_number: u64,
    pub(crate) data: Bytes,
    pub(crate) entry_count: u32,
    pub(crate) smallest_key: Bytes,
    pub(crate) largest_key: Bytes,
    /// Bytes of record payloads (everything but the footer).
    pub(crate) live_data_size: u64,
}

impl EncodedBlobFile {
    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Builds a blob file record by record. `add` returns the [`BlobHandle`]
/// addressing the record just written, in file order.
pub struct BlobFileBuilder {
    file_number: u64,
    buf: BytesMut,
    entry_count: u32,
    smallest_key: Option<Bytes>,
    largest_key: Option<Bytes>,
}

impl BlobFileBuilder {
    pub fn new(file_number: u64) -> Self {
        Self {
            file_number,
            buf: BytesMut::new(),
            entry_count: 0,
            smallest_key: None,
            largest_key: None,
        }
    }

    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> BlobHandle {
        let offset = self.buf.len() as u64;
        encode_record(&mut self.buf, key, value);
        let order = self.entry_count;
        self.entry_count += 1;
        if self.smallest_key.is_none() {
            self.smallest_key = Some(Bytes::copy_from_slice(key));
        }
        self.largest_key = Some(Bytes::copy_from_slice(key));
        BlobHandle {
            offset,
            size: record_size(key.len(), value.len()),
            order,
        }
    }

    /// Bytes of encoded records so far; drives output rolling.
    pub fn current_size(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn finish(mut self) -> EncodedBlobFile {
        let live_data_size = self.buf.len() as u64;
        let smallest_key = self.smallest_key.unwrap_or_default();
        let largest_key = self.largest_key.unwrap_or_default();
        let footer = BlobFileFooter {
            entry_count: self.entry_count,
            smallest_key: smallest_key.clone(),
            largest_key: largest_key.clone(),
            encoded_size: 0,
        };
        footer.encode(&mut self.buf);
        EncodedBlobFile {
            file_number: self.file_number,
            data: self.buf.freeze(),
            entry_count: self.entry_count,
            smallest_key,
            largest_key,
            live_data_size,
        }
    }
}

/// The lifecycle state of a blob file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobFileState {
    /// Readable and referenced (or referenceable) from the LSM.
    Normal,
    /// Garbage-collection output that has not been published yet.
    PendingGcOutput,
    /// No LSM reference at or after the file's obsolete sequence.
    Obsolete,
}

/// Discardable-ratio bucket a blob file falls into, used to aggregate file
/// counts by how much garbage they carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardableRatioBucket {
    Le0,
    Le20,
    Le50,
    Le80,
    Le100,
}

impl DiscardableRatioBucket {
    pub fn for_ratio(ratio: f64) -> Self {
        if ratio <= f64::EPSILON {
            DiscardableRatioBucket::Le0
        } else if ratio < 0.2 {
            DiscardableRatioBucket::Le20
        } else if ratio < 0.5 {
            DiscardableRatioBucket::Le50
        } else if ratio < 0.8 {
            DiscardableRatioBucket::Le80
        } else {
            DiscardableRatioBucket::Le100
        }
    }
}

#[derive(Debug)]
struct FileLiveness {
    bitset: LivenessBitset,
    live_data_size: u64,
}

/// Shared metadata for one blob file.
///
/// Identity fields are immutable. State and liveness are mutated behind
/// internal locks; liveness mutation happens only from garbage collection
/// (install-time dropped-bit accounting), never from foreground writers.
#[derive(Debug)]
pub struct BlobFileMeta {
    file_number: u64,
    file_size: u64,
    entry_count: u32,
    smallest_key: Bytes,
    largest_key: Bytes,
    state: Mutex<BlobFileState>,
    liveness: Mutex<FileLiveness>,
}

impl BlobFileMeta {
    fn new(
        file_number: u64,
        file_size: u64,
        entry_count: u32,
        smallest_key: Bytes,
        largest_key: Bytes,
        live_data_size: u64,
        state: BlobFileState,
    ) -> Self {
        Self {
            file_number,
            file_size,
            entry_count,
            smallest_key,
            largest_key,
            state: Mutex::new(state),
            liveness: Mutex::new(FileLiveness {
                bitset: LivenessBitset::new_all_live(entry_count),
                live_data_size,
            }),
        }
    }

    /// A published, readable blob file (foreground write or manifest replay).
    pub fn new_normal(
        file_number: u64,
        file_size: u64,
        entry_count: u32,
        smallest_key: Bytes,
        largest_key: Bytes,
        live_data_size: u64,
    ) -> Self {
        Self::new(
            file_number,
            file_size,
            entry_count,
            smallest_key,
            largest_key,
            live_data_size,
            BlobFileState::Normal,
        )
    }

    /// An unpublished garbage-collection output file.
    pub(crate) fn new_gc_output(encoded: &EncodedBlobFile) -> Self {
        Self::new(
            encoded.file_number,
            encoded.file_size(),
            encoded.entry_count,
            encoded.smallest_key.clone(),
            encoded.largest_key.clone(),
            encoded.live_data_size,
            BlobFileState::PendingGcOutput,
        )
    }

    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn smallest_key(&self) -> &Bytes {
        &self.smallest_key
    }

    pub fn largest_key(&self) -> &Bytes {
        &self.largest_key
    }

    pub fn state(&self) -> BlobFileState {
        *self.state.lock()
    }

    pub fn is_obsolete(&self) -> bool {
        self.state() == BlobFileState::Obsolete
    }

    /// Publishes a pending garbage-collection output.
    pub(crate) fn mark_installed(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(*state, BlobFileState::PendingGcOutput);
        *state = BlobFileState::Normal;
    }

    /// Returns true if the file was newly marked obsolete, false if a
    /// concurrent edit got there first.
    pub(crate) fn mark_obsolete(&self) -> bool {
        let mut state = self.state.lock();
        if *state == BlobFileState::Obsolete {
            return false;
        }
        *state = BlobFileState::Obsolete;
        true
    }

    pub fn is_live(&self, order: u32) -> bool {
        self.liveness.lock().bitset.is_live(order)
    }

    /// Clears the liveness bit for `order`. Returns true if the bit was set.
    pub(crate) fn clear_live(&self, order: u32) -> bool {
        self.liveness.lock().bitset.clear(order)
    }

    pub fn live_data_size(&self) -> u64 {
        self.liveness.lock().live_data_size
    }

    pub(crate) fn update_live_data_size(&self, delta: i64) {
        let mut liveness = self.liveness.lock();
        liveness.live_data_size = liveness.live_data_size.saturating_add_signed(delta);
    }

    /// Fraction of the file's data that is provably garbage. Drives GC
    /// candidate selection; higher scores are better candidates.
    pub fn gc_score(&self) -> f64 {
        if self.file_size == 0 {
            return 0.0;
        }
        let live = self.live_data_size() as f64;
        (1.0 - live / self.file_size as f64).clamp(0.0, 1.0)
    }

    pub fn discardable_ratio_bucket(&self) -> DiscardableRatioBucket {
        DiscardableRatioBucket::for_ratio(self.gc_score())
    }
}
