//! Side-car index files ("shadows") written by garbage collection when
//! `rewrite_shadow` is enabled.
//!
//! Instead of committing relocated blob indices through the LSM write path,
//! the job appends `(user_key, blob_index)` entries to one builder per LSM
//! level and installs the finished files into the [`ShadowSet`]. Downstream
//! ingestion of shadow files into the LSM is outside this crate.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use parking_lot::Mutex;
use tracing::info;

use crate::blob_index::{BlobIndex, BLOB_INDEX_ENCODED_SIZE};
use crate::error::BlobDbError;
use crate::paths::PathResolver;
use crate::utils::MonotonicSeq;

/// Shadow builders are keyed by LSM level; deeper levels clamp to the last
/// slot.
pub(crate) const MAX_SHADOW_LEVELS: usize = 7;

const SHADOW_FORMAT_VERSION: u16 = 1;
const SHADOW_FILE_MAGIC: u32 = 0x5AD0_0057;

/// Metadata for an installed shadow file.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowFileMeta {
    pub file_number: u64,
    pub level: usize,
    pub file_size: u64,
    pub entry_count: u32,
}

/// A fully-encoded shadow file, ready to install.
pub(crate) struct EncodedShadowFile {
    pub(crate) file_number: u64,
    pub(crate) level: usize,
    pub(crate) data: Bytes,
    pub(crate) entry_count: u32,
}

/// Builds one shadow file: `(key, blob_index)` entries in scan order,
/// followed by an entry count, checksum, version, and magic.
pub(crate) struct ShadowSstBuilder {
    file_number: u64,
    level: usize,
    buf: BytesMut,
    entry_count: u32,
}

impl ShadowSstBuilder {
    pub(crate) fn new(file_number: u64, level: usize) -> Self {
        Self {
            file_number,
            level,
            buf: BytesMut::new(),
            entry_count: 0,
        }
    }

    pub(crate) fn add(&mut self, key: &[u8], index: &BlobIndex) {
        self.buf.put_u32(key.len() as u32);
        self.buf.put_slice(key);
        self.buf.put_slice(&index.encode());
        self.entry_count += 1;
    }

    pub(crate) fn estimated_size(&self) -> u64 {
        self.buf.len() as u64
    }

    pub(crate) fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub(crate) fn finish(mut self) -> EncodedShadowFile {
        self.buf.put_u32(self.entry_count);
        let checksum = crc32fast::hash(&self.buf);
        self.buf.put_u32(checksum);
        self.buf.put_u16(SHADOW_FORMAT_VERSION);
        self.buf.put_u32(SHADOW_FILE_MAGIC);
        EncodedShadowFile {
            file_number: self.file_number,
            level: self.level,
            data: self.buf.freeze(),
            entry_count: self.entry_count,
        }
    }
}

/// Decodes the entries of an encoded shadow file.
pub(crate) fn decode_shadow_entries(bytes: &Bytes) -> Result<Vec<(Bytes, BlobIndex)>, BlobDbError> {
    let invalid = |msg: &str| BlobDbError::InvalidBlobFile {
        msg: msg.to_string(),
    };
    if bytes.len() < 14 {
        return Err(invalid("shadow file too short"));
    }
    let mut tail = &bytes[bytes.len() - 6..];
    if tail.get_u16() != SHADOW_FORMAT_VERSION {
        return Err(invalid("unsupported shadow version"));
    }
    if tail.get_u32() != SHADOW_FILE_MAGIC {
        return Err(invalid("bad shadow magic"));
    }
    let checksum_offset = bytes.len() - 10;
    let expected = (&bytes[checksum_offset..checksum_offset + 4]).get_u32();
    if crc32fast::hash(&bytes[..checksum_offset]) != expected {
        return Err(BlobDbError::ChecksumMismatch);
    }
    let entry_count = (&bytes[checksum_offset - 4..checksum_offset]).get_u32();
    let mut buf = bytes.slice(..checksum_offset - 4);
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        if buf.remaining() < 4 {
            return Err(invalid("truncated shadow entry"));
        }
        let key_len = buf.get_u32() as usize;
        if buf.remaining() < key_len + BLOB_INDEX_ENCODED_SIZE {
            return Err(invalid("truncated shadow entry"));
        }
        let key = buf.copy_to_bytes(key_len);
        let index_bytes = buf.copy_to_bytes(BLOB_INDEX_ENCODED_SIZE);
        entries.push((key, BlobIndex::decode(&index_bytes)?));
    }
    if buf.has_remaining() {
        return Err(invalid("trailing shadow bytes"));
    }
    Ok(entries)
}

/// Registry of installed shadow files.
pub struct ShadowSet {
    object_store: Arc<dyn ObjectStore>,
    paths: PathResolver,
    next_file_number: MonotonicSeq,
    shadows: Mutex<Vec<ShadowFileMeta>>,
}

impl ShadowSet {
    pub fn new<P: Into<Path>>(object_store: Arc<dyn ObjectStore>, root_path: P) -> Self {
        Self {
            object_store,
            paths: PathResolver::new(root_path),
            next_file_number: MonotonicSeq::new(0),
            shadows: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn new_file_number(&self) -> u64 {
        self.next_file_number.next()
    }

    pub(crate) fn shadow_path(&self, file_number: u64, level: usize) -> Path {
        self.paths.shadow_file_path(file_number, level)
    }

    /// Writes and registers a batch of finished shadow files.
    pub(crate) async fn install(
        &self,
        files: Vec<EncodedShadowFile>,
    ) -> Result<Vec<ShadowFileMeta>, BlobDbError> {
        let mut installed = Vec::with_capacity(files.len());
        for file in files {
            let path = self.shadow_path(file.file_number, file.level);
            let file_size = file.data.len() as u64;
            self.object_store
                .put(&path, PutPayload::from_bytes(file.data))
                .await?;
            info!(
                file_number = file.file_number,
                level = file.level,
                entries = file.entry_count,
                "installed shadow file"
            );
            installed.push(ShadowFileMeta {
                file_number: file.file_number,
                level: file.level,
                file_size,
                entry_count: file.entry_count,
            });
        }
        self.shadows.lock().extend(installed.iter().cloned());
        Ok(installed)
    }

    pub fn shadows(&self) -> Vec<ShadowFileMeta> {
        self.shadows.lock().clone()
    }

    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }
}
