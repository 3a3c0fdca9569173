//! The interface blobdb consumes from the LSM engine that owns the
//! authoritative key-to-value mapping.
//!
//! The garbage collector needs three things beyond a plain key-value store:
//! a point lookup that preserves the blob-index flag (and reports the LSM
//! level the value was found at), a write path that consults an optimistic
//! [`WriteCallback`] under the engine's write serialization before
//! committing, and a WAL durability barrier.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;

use crate::blob_index::BlobIndex;
use crate::error::BlobDbError;

/// The current LSM value for a user key.
#[derive(Clone, Debug)]
pub struct LsmEntry {
    /// The raw value bytes; an encoded [`BlobIndex`] when `is_blob_index`.
    pub value: Bytes,
    /// Whether `value` is an external blob pointer rather than an inline
    /// value.
    pub is_blob_index: bool,
    /// The level the value was found at. Informational only: liveness
    /// decisions never depend on it.
    pub level: u32,
}

/// A single-key rewrite the garbage collector asks the LSM to commit.
///
/// Each op commits as its own write batch; the attached callback forbids
/// batching so per-key conflict decisions cannot be conflated.
#[derive(Clone, Debug)]
pub enum RewriteOp {
    /// Reinline the raw value (fallback mode).
    PutValue { key: Bytes, value: Bytes },
    /// Point the key at a relocated blob record.
    PutBlobIndex { key: Bytes, index: BlobIndex },
}

impl RewriteOp {
    pub fn key(&self) -> &Bytes {
        match self {
            RewriteOp::PutValue { key, .. } => key,
            RewriteOp::PutBlobIndex { key, .. } => key,
        }
    }

    /// Bytes this op writes into the LSM.
    pub(crate) fn data_size(&self) -> u64 {
        match self {
            RewriteOp::PutValue { key, value } => (key.len() + value.len()) as u64,
            RewriteOp::PutBlobIndex { key, .. } => {
                (key.len() + crate::blob_index::BLOB_INDEX_ENCODED_SIZE) as u64
            }
        }
    }
}

/// Commit-time gate for a [`RewriteOp`].
///
/// The engine invokes `callback` immediately before committing the op, while
/// holding whatever locks it uses to serialize writes. A `Busy` result means
/// the op lost an optimistic race and must be skipped; any other error fails
/// the write. The callback must not block on engine-external locks.
#[async_trait]
pub trait WriteCallback: Send {
    async fn callback(&mut self, db: &dyn LsmEngine) -> Result<(), BlobDbError>;

    /// Whether the engine may coalesce this op with others. Garbage
    /// collection always answers false.
    fn allow_write_batching(&self) -> bool {
        false
    }
}

/// The LSM engine as seen by blobdb.
#[async_trait]
pub trait LsmEngine: Send + Sync {
    /// Point lookup that preserves the blob-index flag and reports the level
    /// the value was found at.
    async fn get_blob_index_entry(
        &self,
        cf_id: u32,
        key: &[u8],
    ) -> Result<Option<LsmEntry>, BlobDbError>;

    /// Commits `op` iff `callback` returns OK; otherwise returns the
    /// callback's error and leaves the LSM untouched.
    async fn write_with_callback(
        &self,
        cf_id: u32,
        op: &RewriteOp,
        callback: &mut dyn WriteCallback,
    ) -> Result<(), BlobDbError>;

    /// Durability barrier: flushes and syncs the write-ahead log.
    async fn flush_wal(&self) -> Result<(), BlobDbError>;

    /// The engine's latest committed sequence number.
    fn latest_sequence(&self) -> u64;
}

#[derive(Clone, Debug)]
struct InMemoryEntry {
    value: Bytes,
    is_blob_index: bool,
    level: u32,
}

/// A minimal in-memory [`LsmEngine`] for tests and examples, in the spirit of
/// `object_store::memory::InMemory`.
///
/// Writes serialize through an async mutex so callbacks observe the same
/// commit-time exclusivity a real engine provides.
pub struct InMemoryLsm {
    cfs: parking_lot::Mutex<HashMap<u32, BTreeMap<Bytes, InMemoryEntry>>>,
    latest_seq: AtomicU64,
    wal_flushes: AtomicU64,
    write_lock: tokio::sync::Mutex<()>,
}

impl InMemoryLsm {
    pub fn new() -> Self {
        Self {
            cfs: parking_lot::Mutex::new(HashMap::new()),
            latest_seq: AtomicU64::new(0),
            wal_flushes: AtomicU64::new(0),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn put_inline(&self, cf_id: u32, key: &[u8], value: &[u8]) {
        self.insert(
            cf_id,
            key,
            InMemoryEntry {
                value: Bytes::copy_from_slice(value),
                is_blob_index: false,
                level: 0,
            },
        );
    }

    pub fn put_blob_index(&self, cf_id: u32, key: &[u8], index: &BlobIndex) {
        self.put_blob_index_at_level(cf_id, key, index, 0);
    }

    pub fn put_blob_index_at_level(&self, cf_id: u32, key: &[u8], index: &BlobIndex, level: u32) {
        self.insert(
            cf_id,
            key,
            InMemoryEntry {
                value: index.encode(),
                is_blob_index: true,
                level,
            },
        );
    }

    pub fn delete(&self, cf_id: u32, key: &[u8]) {
        self.cfs
            .lock()
            .entry(cf_id)
            .or_default()
            .remove(&Bytes::copy_from_slice(key));
        self.latest_seq.fetch_add(1, Ordering::SeqCst);
    }

    /// The raw value and blob-index flag currently stored for `key`.
    pub fn get(&self, cf_id: u32, key: &[u8]) -> Option<(Bytes, bool)> {
        self.cfs
            .lock()
            .get(&cf_id)
            .and_then(|cf| cf.get(key))
            .map(|entry| (entry.value.clone(), entry.is_blob_index))
    }

    pub fn wal_flush_count(&self) -> u64 {
        self.wal_flushes.load(Ordering::SeqCst)
    }

    fn insert(&self, cf_id: u32, key: &[u8], entry: InMemoryEntry) {
        self.cfs
            .lock()
            .entry(cf_id)
            .or_default()
            .insert(Bytes::copy_from_slice(key), entry);
        self.latest_seq.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryLsm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LsmEngine for InMemoryLsm {
    async fn get_blob_index_entry(
        &self,
        cf_id: u32,
        key: &[u8],
    ) -> Result<Option<LsmEntry>, BlobDbError> {
        Ok(self
            .cfs
            .lock()
            .get(&cf_id)
            .and_then(|cf| cf.get(key))
            .map(|entry| LsmEntry {
                value: entry.value.clone(),
                is_blob_index: entry.is_blob_index,
                level: entry.level,
            }))
    }

    async fn write_with_callback(
        &self,
        cf_id: u32,
        op: &RewriteOp,
        callback: &mut dyn WriteCallback,
    ) -> Result<(), BlobDbError> {
        let _guard = self.write_lock.lock().await;
        callback.callback(self).await?;
        match op {
            RewriteOp::PutValue { key, value } => self.insert(
                cf_id,
                key,
                InMemoryEntry {
                    value: value.clone(),
                    is_blob_index: false,
                    level: 0,
                },
            ),
            RewriteOp::PutBlobIndex { key, index } => self.insert(
                cf_id,
                key,
                InMemoryEntry {
                    value: index.encode(),
                    is_blob_index: true,
                    level: 0,
                },
            ),
        }
        Ok(())
    }

    async fn flush_wal(&self) -> Result<(), BlobDbError> {
        self.wal_flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn latest_sequence(&self) -> u64 {
        self.latest_seq.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RejectingCallback;

    #[async_trait]
    impl WriteCallback for RejectingCallback {
        async fn callback(&mut self, _db: &dyn LsmEngine) -> Result<(), BlobDbError> {
            Err(BlobDbError::Busy("key deleted"))
        }
    }

    struct AcceptingCallback;

    #[async_trait]
    impl WriteCallback for AcceptingCallback {
        async fn callback(&mut self, _db: &dyn LsmEngine) -> Result<(), BlobDbError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_with_callback_commits_on_ok() {
        let lsm = InMemoryLsm::new();
        let op = RewriteOp::PutValue {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        };
        lsm.write_with_callback(0, &op, &mut AcceptingCallback)
            .await
            .unwrap();
        assert_eq!(lsm.get(0, b"k"), Some((Bytes::from_static(b"v"), false)));
    }

    #[tokio::test]
    async fn test_write_with_callback_skips_on_busy() {
        let lsm = InMemoryLsm::new();
        let op = RewriteOp::PutValue {
            key: Bytes::from_static(b"k"),
            value: Bytes::from_static(b"v"),
        };
        let err = lsm
            .write_with_callback(0, &op, &mut RejectingCallback)
            .await
            .unwrap_err();
        assert!(err.is_busy());
        assert!(lsm.get(0, b"k").is_none());
    }

    #[tokio::test]
    async fn test_sequence_advances_on_writes() {
        let lsm = InMemoryLsm::new();
        assert_eq!(lsm.latest_sequence(), 0);
        lsm.put_inline(0, b"a", b"1");
        lsm.delete(0, b"a");
        assert_eq!(lsm.latest_sequence(), 2);
    }

    #[tokio::test]
    async fn test_lookup_preserves_blob_index_flag_and_level() {
        let lsm = InMemoryLsm::new();
        let index = BlobIndex::new(3, 0, 17, 0);
        lsm.put_blob_index_at_level(0, b"k", &index, 4);
        let entry = lsm.get_blob_index_entry(0, b"k").await.unwrap().unwrap();
        assert!(entry.is_blob_index);
        assert_eq!(entry.level, 4);
        assert_eq!(BlobIndex::decode(&entry.value).unwrap(), index);
    }
}
