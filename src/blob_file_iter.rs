use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;

use crate::blob_file::{decode_record, BlobFileFooter, FOOTER_TAIL_SIZE, RECORD_HEADER_SIZE};
use crate::blob_index::BlobIndex;
use crate::error::BlobDbError;
use crate::types::BlobEntry;

/// How many bytes to fetch per ranged read while scanning records.
const READ_AHEAD_BYTES: u64 = 4 * 1024 * 1024;

/// Forward iterator over one blob file, yielding records in file order with
/// the [`BlobIndex`] that addresses each of them.
///
/// Reads are ranged and windowed so a scan never holds more than the
/// read-ahead window (plus one oversized record) in memory.
pub(crate) struct BlobFileIterator {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    file_number: u64,
    file_size: u64,
    records_end: u64,
    entry_count: u32,
    window: Bytes,
    window_offset: u64,
    next_offset: u64,
    next_order: u32,
    initialized: bool,
}

impl BlobFileIterator {
    pub(crate) fn new(
        object_store: Arc<dyn ObjectStore>,
        path: Path,
        file_number: u64,
        file_size: u64,
    ) -> Self {
        Self {
            object_store,
            path,
            file_number,
            file_size,
            records_end: 0,
            entry_count: 0,
            window: Bytes::new(),
            window_offset: 0,
            next_offset: 0,
            next_order: 0,
            initialized: false,
        }
    }

    /// Reads and validates the footer. Idempotent.
    pub(crate) async fn init(&mut self) -> Result<(), BlobDbError> {
        if self.initialized {
            return Ok(());
        }
        if self.file_size < FOOTER_TAIL_SIZE as u64 {
            return Err(BlobDbError::InvalidBlobFile {
                msg: format!("file {} too small for footer", self.file_number),
            });
        }
        let tail = self
            .object_store
            .get_range(
                &self.path,
                self.file_size - FOOTER_TAIL_SIZE as u64..self.file_size,
            )
            .await?;
        let footer_len = BlobFileFooter::decode_tail(&tail)? as u64;
        let footer_start = self
            .file_size
            .checked_sub(FOOTER_TAIL_SIZE as u64 + footer_len)
            .ok_or_else(|| BlobDbError::InvalidBlobFile {
                msg: format!("file {} footer length out of bounds", self.file_number),
            })?;
        let footer_bytes = self
            .object_store
            .get_range(
                &self.path,
                footer_start..self.file_size - FOOTER_TAIL_SIZE as u64,
            )
            .await?;
        let footer = BlobFileFooter::decode(&footer_bytes)?;
        self.records_end = self.file_size - footer.encoded_size;
        self.entry_count = footer.entry_count;
        self.initialized = true;
        Ok(())
    }

    /// Returns the next record, or `None` at end of file. Any read or decode
    /// error terminates iteration.
    pub(crate) async fn next_entry(&mut self) -> Result<Option<BlobEntry>, BlobDbError> {
        debug_assert!(self.initialized);
        if self.next_offset >= self.records_end {
            if self.next_order != self.entry_count {
                return Err(BlobDbError::InvalidBlobFile {
                    msg: format!(
                        "file {} footer declares {} entries but {} were read",
                        self.file_number, self.entry_count, self.next_order
                    ),
                });
            }
            return Ok(None);
        }

        self.ensure_window(RECORD_HEADER_SIZE as u64).await?;
        let header = self.window_slice();
        if header.len() < RECORD_HEADER_SIZE {
            return Err(BlobDbError::InvalidBlobFile {
                msg: format!("file {} truncated record header", self.file_number),
            });
        }
        let key_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let value_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;
        let total = crate::blob_file::record_size(key_len as usize, value_len as usize);
        if self.next_offset + total > self.records_end {
            return Err(BlobDbError::InvalidBlobFile {
                msg: format!("file {} record overruns footer", self.file_number),
            });
        }
        self.ensure_window(total).await?;

        let record = self.window_slice();
        let (key, value, consumed) = decode_record(&record)?;
        debug_assert_eq!(consumed as u64, total);

        let entry = BlobEntry {
            key,
            blob_index: BlobIndex::new(self.file_number, self.next_offset, total, self.next_order),
            value,
        };
        self.next_offset += total;
        self.next_order += 1;
        Ok(Some(entry))
    }

    /// Ensures at least `len` bytes starting at `next_offset` are buffered.
    async fn ensure_window(&mut self, len: u64) -> Result<(), BlobDbError> {
        let window_end = self.window_offset + self.window.len() as u64;
        if self.next_offset >= self.window_offset && self.next_offset + len <= window_end {
            return Ok(());
        }
        let fetch_end = (self.next_offset + len.max(READ_AHEAD_BYTES)).min(self.records_end);
        self.window = self
            .object_store
            .get_range(&self.path, self.next_offset..fetch_end)
            .await?;
        self.window_offset = self.next_offset;
        Ok(())
    }

    /// The buffered bytes from `next_offset` to the end of the window.
    fn window_slice(&self) -> Bytes {
        let start = (self.next_offset - self.window_offset) as usize;
        self.window.slice(start..)
    }
}
