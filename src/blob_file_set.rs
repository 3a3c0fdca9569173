use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use bytes::Bytes;

use crate::blob_file::{decode_record, BlobFileMeta};
use crate::blob_index::BlobIndex;
use crate::error::BlobDbError;
use crate::paths::PathResolver;
use crate::utils::MonotonicSeq;
use crate::version_edit::{EditRecord, VersionEdit};

pub mod stats;

use stats::BlobStorageStats;

/// A GC-candidate ranking entry: the file and its discardable ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GcScore {
    pub file_number: u64,
    pub score: f64,
}

/// Per-column-family registry of blob files.
///
/// Holds the shared [`BlobFileMeta`]s, the GC-candidate ranking, and the
/// dropped flag checked by in-flight garbage collection. Registration,
/// liveness corrections, and obsoletion keep the discardable-ratio bucket
/// gauges in [`BlobStorageStats`] aligned with the non-obsolete population.
pub struct BlobStorage {
    cf_id: u32,
    files: RwLock<HashMap<u64, Arc<BlobFileMeta>>>,
    gc_scores: Mutex<Vec<GcScore>>,
    dropped: AtomicBool,
    stats: Arc<BlobStorageStats>,
}

impl BlobStorage {
    fn new(cf_id: u32, stats: Arc<BlobStorageStats>) -> Self {
        Self {
            cf_id,
            files: RwLock::new(HashMap::new()),
            gc_scores: Mutex::new(Vec::new()),
            dropped: AtomicBool::new(false),
            stats,
        }
    }

    pub fn cf_id(&self) -> u32 {
        self.cf_id
    }

    pub fn find_file(&self, file_number: u64) -> Option<Arc<BlobFileMeta>> {
        self.files.read().get(&file_number).cloned()
    }

    pub(crate) fn register_file(&self, meta: Arc<BlobFileMeta>) {
        let bucket = meta.discardable_ratio_bucket();
        let prev = self.files.write().insert(meta.file_number(), meta);
        if let Some(prev) = prev {
            if !prev.is_obsolete() {
                self.stats
                    .bucket_gauge(prev.discardable_ratio_bucket())
                    .dec();
            }
        }
        self.stats.bucket_gauge(bucket).inc();
    }

    /// Marks the file obsolete and releases its bucket gauge. Returns false
    /// if the file is unknown or a concurrent edit already retired it.
    pub(crate) fn retire_file(&self, file_number: u64) -> bool {
        let Some(meta) = self.find_file(file_number) else {
            return false;
        };
        if !meta.mark_obsolete() {
            return false;
        }
        self.stats
            .bucket_gauge(meta.discardable_ratio_bucket())
            .dec();
        true
    }

    /// Clears the liveness bits of records that lost their rewrite race and
    /// subtracts their bytes, moving the file between discardable-ratio
    /// buckets and refreshing the GC ranking. Returns false if the file is
    /// unknown.
    pub(crate) fn apply_dropped_records(
        &self,
        file_number: u64,
        orders: &BTreeSet<u32>,
        dropped_bytes: u64,
    ) -> bool {
        let Some(file) = self.find_file(file_number) else {
            return false;
        };
        let bucket_before = file.discardable_ratio_bucket();
        for &order in orders {
            file.clear_live(order);
        }
        file.update_live_data_size(-(dropped_bytes as i64));
        if !file.is_obsolete() {
            self.stats.bucket_gauge(bucket_before).dec();
            self.stats
                .bucket_gauge(file.discardable_ratio_bucket())
                .inc();
        }
        self.compute_gc_score();
        true
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn set_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
    }

    /// Recomputes the GC-candidate ranking from current liveness, sorted by
    /// descending discardable ratio. Obsolete files are excluded.
    pub fn compute_gc_score(&self) {
        let mut scores: Vec<GcScore> = self
            .files
            .read()
            .values()
            .filter(|meta| !meta.is_obsolete())
            .map(|meta| GcScore {
                file_number: meta.file_number(),
                score: meta.gc_score(),
            })
            .collect();
        scores.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        *self.gc_scores.lock() = scores;
    }

    /// The current GC-candidate ranking, best candidates first.
    pub fn gc_scores(&self) -> Vec<GcScore> {
        self.gc_scores.lock().clone()
    }
}

/// The blob-side version set: per-column-family storages plus the durable
/// manifest of blob-file additions and obsoletions.
///
/// Each [`VersionEdit`] is persisted as its own numbered manifest object
/// (create-if-absent, so concurrent writers conflict loudly instead of
/// clobbering each other) and then applied to the in-memory registries.
pub struct BlobFileSet {
    object_store: Arc<dyn ObjectStore>,
    paths: PathResolver,
    storages: RwLock<HashMap<u32, Arc<BlobStorage>>>,
    next_file_number: MonotonicSeq,
    next_manifest_id: MonotonicSeq,
    stats: Arc<BlobStorageStats>,
}

impl BlobFileSet {
    pub fn new<P: Into<Path>>(
        object_store: Arc<dyn ObjectStore>,
        root_path: P,
        stats: Arc<BlobStorageStats>,
    ) -> Self {
        Self {
            object_store,
            paths: PathResolver::new(root_path),
            storages: RwLock::new(HashMap::new()),
            next_file_number: MonotonicSeq::new(0),
            next_manifest_id: MonotonicSeq::new(0),
            stats,
        }
    }

    pub(crate) fn path_resolver(&self) -> &PathResolver {
        &self.paths
    }

    pub(crate) fn object_store(&self) -> Arc<dyn ObjectStore> {
        self.object_store.clone()
    }

    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.next()
    }

    pub fn storage(&self, cf_id: u32) -> Option<Arc<BlobStorage>> {
        self.storages.read().get(&cf_id).cloned()
    }

    pub fn storage_or_create(&self, cf_id: u32) -> Arc<BlobStorage> {
        if let Some(storage) = self.storage(cf_id) {
            return storage;
        }
        let mut storages = self.storages.write();
        storages
            .entry(cf_id)
            .or_insert_with(|| Arc::new(BlobStorage::new(cf_id, self.stats.clone())))
            .clone()
    }

    /// Marks a column family dropped. In-flight garbage collection observes
    /// the flag and aborts its LSM rewrites.
    pub fn drop_column_family(&self, cf_id: u32) {
        if let Some(storage) = self.storage(cf_id) {
            storage.set_dropped();
        }
    }

    /// Persists `edit` to the manifest and applies it to the in-memory state.
    ///
    /// Added files are registered as fresh normal-state metas; use
    /// [`BlobFileSet::log_and_apply_with_metas`] when the caller already holds
    /// the metas (garbage-collection publish keeps the shared meta identity).
    pub async fn log_and_apply(&self, edit: VersionEdit) -> Result<(), BlobDbError> {
        self.log_and_apply_with_metas(edit, &[]).await
    }

    pub(crate) async fn log_and_apply_with_metas(
        &self,
        edit: VersionEdit,
        metas: &[Arc<BlobFileMeta>],
    ) -> Result<(), BlobDbError> {
        if edit.is_empty() {
            return Ok(());
        }
        let id = self.next_manifest_id.next();
        let path = self.paths.manifest_path(id);
        let result = self
            .object_store
            .put_opts(
                &path,
                PutPayload::from_bytes(edit.encode()),
                PutOptions::from(PutMode::Create),
            )
            .await;
        match result {
            Ok(_) => {}
            Err(object_store::Error::AlreadyExists { .. }) => {
                return Err(BlobDbError::FileVersionExists)
            }
            Err(e) => return Err(e.into()),
        }
        debug!(manifest_id = id, cf_id = edit.cf_id, "applied version edit");
        self.apply(&edit, metas);
        Ok(())
    }

    fn apply(&self, edit: &VersionEdit, metas: &[Arc<BlobFileMeta>]) {
        let storage = self.storage_or_create(edit.cf_id);
        for record in &edit.records {
            match record {
                EditRecord::AddBlobFile {
                    file_number,
                    file_size,
                    entry_count,
                    live_data_size,
                    smallest_key,
                    largest_key,
                } => {
                    self.next_file_number.store_if_greater(*file_number);
                    let meta = metas
                        .iter()
                        .find(|m| m.file_number() == *file_number)
                        .cloned()
                        .unwrap_or_else(|| {
                            Arc::new(BlobFileMeta::new_normal(
                                *file_number,
                                *file_size,
                                *entry_count,
                                smallest_key.clone(),
                                largest_key.clone(),
                                *live_data_size,
                            ))
                        });
                    storage.register_file(meta);
                }
                EditRecord::DeleteBlobFile { file_number, .. } => {
                    if storage.find_file(*file_number).is_none() {
                        warn!(
                            file_number,
                            cf_id = edit.cf_id,
                            "obsoleting unknown blob file"
                        );
                    } else {
                        // Already-obsolete inputs are expected under
                        // concurrent range deletion.
                        storage.retire_file(*file_number);
                    }
                }
            }
        }
        storage.compute_gc_score();
    }

    /// Reads the `(key, value)` record addressed by `blob_index` straight
    /// from its blob file.
    pub async fn read_record(&self, blob_index: &BlobIndex) -> Result<(Bytes, Bytes), BlobDbError> {
        let path = self.paths.blob_file_path(blob_index.file_number);
        let handle = &blob_index.blob_handle;
        let bytes = self
            .object_store
            .get_range(&path, handle.offset..handle.offset + handle.size)
            .await?;
        let (key, value, _) = decode_record(&bytes)?;
        Ok((key, value))
    }

    /// Rebuilds the in-memory state by replaying the manifest in id order.
    pub async fn recover(&self) -> Result<(), BlobDbError> {
        let mut manifest_ids = Vec::new();
        let mut stream = self.object_store.list(Some(&self.paths.manifest_dir()));
        while let Some(object) = stream.next().await.transpose()? {
            if let Some(id) = self.paths.parse_manifest_id(&object.location) {
                manifest_ids.push(id);
            }
        }
        manifest_ids.sort_unstable();
        for id in manifest_ids {
            let bytes = self
                .object_store
                .get(&self.paths.manifest_path(id))
                .await?
                .bytes()
                .await?;
            let edit = VersionEdit::decode(&bytes)?;
            self.apply(&edit, &[]);
            self.next_manifest_id.store_if_greater(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatRegistry;
    use object_store::memory::InMemory;

    fn build_set(store: Arc<dyn ObjectStore>) -> (BlobFileSet, Arc<BlobStorageStats>) {
        let registry = Arc::new(StatRegistry::new());
        let stats = Arc::new(BlobStorageStats::new(registry));
        (BlobFileSet::new(store, "/db", stats.clone()), stats)
    }

    fn add_file_edit(cf_id: u32, file_number: u64, live: u64, size: u64) -> VersionEdit {
        let mut edit = VersionEdit::new(cf_id);
        edit.records.push(EditRecord::AddBlobFile {
            file_number,
            file_size: size,
            entry_count: 1,
            live_data_size: live,
            smallest_key: Bytes::from_static(b"a"),
            largest_key: Bytes::from_static(b"z"),
        });
        edit
    }

    #[tokio::test]
    async fn test_log_and_apply_registers_files() {
        let (set, _) = build_set(Arc::new(InMemory::new()));
        set.log_and_apply(add_file_edit(0, 1, 80, 100)).await.unwrap();
        set.log_and_apply(add_file_edit(0, 2, 100, 100)).await.unwrap();

        let storage = set.storage(0).unwrap();
        assert_eq!(storage.file_count(), 2);
        // next allocation continues past replayed file numbers
        assert_eq!(set.new_file_number(), 3);

        let scores = storage.gc_scores();
        assert_eq!(scores.len(), 2);
        // file 1 has more garbage, so it ranks first
        assert_eq!(scores[0].file_number, 1);
    }

    #[tokio::test]
    async fn test_delete_marks_obsolete_and_drops_from_scores() {
        let (set, _) = build_set(Arc::new(InMemory::new()));
        set.log_and_apply(add_file_edit(0, 1, 80, 100)).await.unwrap();

        let mut edit = VersionEdit::new(0);
        edit.delete_blob_file(1, 42);
        set.log_and_apply(edit).await.unwrap();

        let storage = set.storage(0).unwrap();
        assert!(storage.find_file(1).unwrap().is_obsolete());
        assert!(storage.gc_scores().is_empty());
    }

    #[tokio::test]
    async fn test_recover_replays_manifest_in_order() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        {
            let (set, _) = build_set(store.clone());
            set.log_and_apply(add_file_edit(0, 1, 80, 100)).await.unwrap();
            set.log_and_apply(add_file_edit(0, 2, 90, 100)).await.unwrap();
            let mut edit = VersionEdit::new(0);
            edit.delete_blob_file(1, 7);
            set.log_and_apply(edit).await.unwrap();
        }

        let (recovered, stats) = build_set(store);
        recovered.recover().await.unwrap();
        let storage = recovered.storage(0).unwrap();
        assert_eq!(storage.file_count(), 2);
        assert!(storage.find_file(1).unwrap().is_obsolete());
        assert!(!storage.find_file(2).unwrap().is_obsolete());
        assert_eq!(recovered.new_file_number(), 3);
        // replay reseeds the bucket gauges for the surviving file only
        assert_eq!(stats.files_discardable_ratio_le20.value(), 1);
        assert_eq!(stats.files_discardable_ratio_le50.value(), 0);
    }

    #[tokio::test]
    async fn test_bucket_gauges_track_file_population() {
        let (set, stats) = build_set(Arc::new(InMemory::new()));
        // fully live file: ratio 0.0
        set.log_and_apply(add_file_edit(0, 1, 100, 100)).await.unwrap();
        // 60% garbage: ratio 0.6
        set.log_and_apply(add_file_edit(0, 2, 40, 100)).await.unwrap();
        assert_eq!(stats.files_discardable_ratio_le0.value(), 1);
        assert_eq!(stats.files_discardable_ratio_le80.value(), 1);

        // obsoleting a file releases its bucket
        let mut edit = VersionEdit::new(0);
        edit.delete_blob_file(1, 9);
        set.log_and_apply(edit).await.unwrap();
        assert_eq!(stats.files_discardable_ratio_le0.value(), 0);
        assert_eq!(stats.files_discardable_ratio_le80.value(), 1);

        // retiring it again changes nothing
        assert!(!set.storage(0).unwrap().retire_file(1));
        assert_eq!(stats.files_discardable_ratio_le0.value(), 0);
    }

    #[tokio::test]
    async fn test_dropped_records_move_file_between_buckets() {
        let (set, stats) = build_set(Arc::new(InMemory::new()));
        // one live 100-byte record in a 100-byte file: ratio 0.0
        set.log_and_apply(add_file_edit(0, 1, 100, 100)).await.unwrap();
        assert_eq!(stats.files_discardable_ratio_le0.value(), 1);

        let storage = set.storage(0).unwrap();
        let orders = BTreeSet::from([0]);
        assert!(storage.apply_dropped_records(1, &orders, 100));
        // all bytes dropped: ratio 1.0
        assert_eq!(stats.files_discardable_ratio_le0.value(), 0);
        assert_eq!(stats.files_discardable_ratio_le100.value(), 1);
        assert!(!storage.find_file(1).unwrap().is_live(0));

        assert!(!storage.apply_dropped_records(99, &orders, 1));
    }

    #[tokio::test]
    async fn test_drop_column_family() {
        let (set, _) = build_set(Arc::new(InMemory::new()));
        set.log_and_apply(add_file_edit(5, 1, 80, 100)).await.unwrap();
        assert!(!set.storage(5).unwrap().is_dropped());
        set.drop_column_family(5);
        assert!(set.storage(5).unwrap().is_dropped());
    }
}
