use async_trait::async_trait;
use bytes::Bytes;

use crate::blob_index::BlobIndex;
use crate::error::BlobDbError;
use crate::lsm::{LsmEngine, WriteCallback};

/// Commit-time check that a key still points at the blob record garbage
/// collection scanned, similar to how optimistic transactions validate reads.
///
/// The rewrite is only safe if the key's current blob index equals the
/// scanned one; anything else means a foreground writer won the race and the
/// rewrite must be dropped.
pub(crate) struct GcWriteCallback {
    cf_id: u32,
    key: Bytes,
    /// The index observed during the scan.
    blob_index: BlobIndex,
    /// Where the record was rewritten to. Empty means the new record is
    /// inlined (fallback mode).
    new_blob_index: BlobIndex,
    read_bytes: u64,
}

impl GcWriteCallback {
    pub(crate) fn new(
        cf_id: u32,
        key: Bytes,
        blob_index: BlobIndex,
        new_blob_index: BlobIndex,
    ) -> Self {
        debug_assert!(!key.is_empty());
        Self {
            cf_id,
            key,
            blob_index,
            new_blob_index,
            read_bytes: 0,
        }
    }

    pub(crate) fn read_bytes(&self) -> u64 {
        self.read_bytes
    }

    /// Size of the old blob record; attributes bytes to the
    /// overwritten/relocated/fallback counters.
    pub(crate) fn blob_record_size(&self) -> u64 {
        self.blob_index.blob_handle.size
    }

    pub(crate) fn new_blob_index(&self) -> &BlobIndex {
        &self.new_blob_index
    }
}

#[async_trait]
impl WriteCallback for GcWriteCallback {
    async fn callback(&mut self, db: &dyn LsmEngine) -> Result<(), BlobDbError> {
        let entry = db.get_blob_index_entry(self.cf_id, &self.key).await?;
        self.read_bytes =
            (self.key.len() + entry.as_ref().map_or(0, |e| e.value.len())) as u64;
        let Some(entry) = entry else {
            // Either the key is deleted or updated with a newer version which
            // is inlined in the LSM.
            return Err(BlobDbError::Busy("key deleted"));
        };
        if !entry.is_blob_index {
            return Err(BlobDbError::Busy("key overwritten with other value"));
        }
        let other_blob_index = BlobIndex::decode(&entry.value)?;
        if other_blob_index != self.blob_index {
            return Err(BlobDbError::Busy("key overwritten with other blob"));
        }
        Ok(())
    }

    fn allow_write_batching(&self) -> bool {
        false
    }
}
