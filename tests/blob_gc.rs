use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blobdb::bytes::Bytes;
use blobdb::gc_stats::{self, GcStats};
use blobdb::object_store::memory::InMemory;
use blobdb::storage_stats::{self, BlobStorageStats};
use blobdb::object_store::path::Path;
use blobdb::object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOptions, PutOptions, PutPayload, PutResult,
};
use blobdb::stats::StatRegistry;
use blobdb::{
    BlobDbError, BlobFileBuilder, BlobFileManager, BlobFileMeta, BlobFileSet, BlobFileState,
    BlobGc, BlobGcJob, BlobIndex, BlobRunMode, GcOptions, InMemoryLsm,
};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

const CF: u32 = 0;

struct TestDb {
    file_set: Arc<BlobFileSet>,
    manager: Arc<BlobFileManager>,
    lsm: Arc<InMemoryLsm>,
    registry: Arc<StatRegistry>,
    stats: Arc<GcStats>,
}

impl TestDb {
    fn new(store: Arc<dyn ObjectStore>) -> Self {
        let registry = Arc::new(StatRegistry::new());
        let stats = Arc::new(GcStats::new(registry.clone()));
        let storage_stats = Arc::new(BlobStorageStats::new(registry.clone()));
        let file_set = Arc::new(BlobFileSet::new(store, "/test_db", storage_stats));
        let manager = Arc::new(BlobFileManager::new(file_set.clone()));
        Self {
            file_set,
            manager,
            lsm: Arc::new(InMemoryLsm::new()),
            registry,
            stats,
        }
    }

    fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Writes one blob file through the foreground path and points the LSM at
    /// every record.
    async fn write_blob_file(&self, entries: &[(&[u8], &[u8])]) -> (Arc<BlobFileMeta>, Vec<BlobIndex>) {
        let handle = self.manager.new_file();
        let file_number = handle.file_number;
        let mut builder = BlobFileBuilder::new(file_number);
        let mut indices = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let blob_handle = builder.add(key, value);
            indices.push(BlobIndex {
                file_number,
                blob_handle,
            });
        }
        let metas = self
            .manager
            .batch_finish_files(CF, &[(handle, builder.finish())])
            .await
            .expect("failed to publish blob file");
        for ((key, _), index) in entries.iter().zip(indices.iter()) {
            self.lsm.put_blob_index(CF, key, index);
        }
        (metas.into_iter().next().unwrap(), indices)
    }

    fn job(&self, inputs: Vec<Arc<BlobFileMeta>>, options: GcOptions) -> BlobGcJob {
        BlobGcJob::new(
            BlobGc::new(CF, inputs, options),
            self.lsm.clone(),
            self.manager.clone(),
            self.file_set.clone(),
            None,
            CancellationToken::new(),
            self.stats.clone(),
        )
    }

    async fn run_gc(&self, inputs: Vec<Arc<BlobFileMeta>>, options: GcOptions) {
        let mut job = self.job(inputs, options);
        job.prepare().unwrap();
        job.run().await.unwrap();
        job.finish().await.unwrap();
    }

    fn stat(&self, name: &'static str) -> i64 {
        self.registry.lookup(name).unwrap().get()
    }

    /// Total files counted across the five discardable-ratio bucket gauges.
    fn bucket_gauge_total(&self) -> i64 {
        [
            storage_stats::FILES_DISCARDABLE_RATIO_LE0,
            storage_stats::FILES_DISCARDABLE_RATIO_LE20,
            storage_stats::FILES_DISCARDABLE_RATIO_LE50,
            storage_stats::FILES_DISCARDABLE_RATIO_LE80,
            storage_stats::FILES_DISCARDABLE_RATIO_LE100,
        ]
        .into_iter()
        .map(|name| self.stat(name))
        .sum()
    }

    /// Resolves `key` the way a reader would: LSM lookup, then blob fetch if
    /// the value is external.
    async fn read_value(&self, key: &[u8]) -> Option<Bytes> {
        let (value, is_blob_index) = self.lsm.get(CF, key)?;
        if !is_blob_index {
            return Some(value);
        }
        let index = BlobIndex::decode(&value).unwrap();
        let (record_key, record_value) = self.file_set.read_record(&index).await.unwrap();
        assert_eq!(record_key, Bytes::copy_from_slice(key));
        Some(record_value)
    }
}

#[tokio::test]
async fn test_clean_relocation() {
    let db = TestDb::in_memory();
    let entries: Vec<(&[u8], &[u8])> = vec![
        (b"a", b"value-of-a"),
        (b"b", b"value-of-b"),
        (b"c", b"value-of-c"),
    ];
    let (input, _) = db.write_blob_file(&entries).await;

    db.run_gc(vec![input.clone()], GcOptions::default()).await;

    // every live key still reads the same value, via a new blob index
    for (key, value) in &entries {
        assert_eq!(db.read_value(key).await.unwrap(), Bytes::copy_from_slice(value));
        let (stored, is_blob_index) = db.lsm.get(CF, key).unwrap();
        assert!(is_blob_index);
        let new_index = BlobIndex::decode(&stored).unwrap();
        assert_ne!(new_index.file_number, input.file_number());
    }

    assert!(input.is_obsolete());
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 3);
    assert_eq!(db.stat(gc_stats::GC_NUM_OUTPUT_FILES), 1);
    assert_eq!(db.stat(gc_stats::GC_NUM_INPUT_FILES), 1);
    // the obsoleted input left the population gauges; the output is counted
    assert_eq!(db.bucket_gauge_total(), 1);
}

#[tokio::test]
async fn test_full_obsoletion_of_deleted_keys() {
    let db = TestDb::in_memory();
    let (input, _) = db
        .write_blob_file(&[(b"a", b"value-of-a"), (b"b", b"value-of-b")])
        .await;
    db.lsm.delete(CF, b"a");
    db.lsm.delete(CF, b"b");

    db.run_gc(vec![input.clone()], GcOptions::default()).await;

    assert!(input.is_obsolete());
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_OVERWRITTEN_CHECK), 2);
    assert_eq!(db.stat(gc_stats::GC_NUM_OUTPUT_FILES), 0);
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 0);
}

#[tokio::test]
async fn test_race_lost_at_callback() {
    let db = TestDb::in_memory();
    let (input, _) = db.write_blob_file(&[(b"a", b"value-of-a")]).await;

    let mut job = db.job(vec![input.clone()], GcOptions::default());
    job.prepare().unwrap();
    job.run().await.unwrap();

    // a foreground writer overwrites the key with a newer blob
    let winner = BlobIndex::new(999, 0, 32, 0);
    db.lsm.put_blob_index(CF, b"a", &winner);

    job.finish().await.unwrap();
    let output_number = job.blob_gc().outputs()[0].file_number();
    drop(job);

    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_OVERWRITTEN_CALLBACK), 1);
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 0);

    // output published with the stale record; its liveness was corrected
    let output = db
        .file_set
        .storage(CF)
        .unwrap()
        .find_file(output_number)
        .unwrap();
    assert_eq!(output.state(), BlobFileState::Normal);
    assert!(!output.is_live(0));
    assert_eq!(output.live_data_size(), 0);

    // the winning write is untouched and the input is still retired
    let (stored, _) = db.lsm.get(CF, b"a").unwrap();
    assert_eq!(BlobIndex::decode(&stored).unwrap(), winner);
    assert!(input.is_obsolete());

    // the output is the only file left in the population gauges, now counted
    // as all garbage
    assert_eq!(db.bucket_gauge_total(), 1);
    assert_eq!(db.stat(storage_stats::FILES_DISCARDABLE_RATIO_LE100), 1);
}

#[tokio::test]
async fn test_fallback_mode_reinlines() {
    let db = TestDb::in_memory();
    let (input, _) = db.write_blob_file(&[(b"a", b"ten-bytes!")]).await;

    let options = GcOptions {
        blob_run_mode: BlobRunMode::Fallback,
        ..GcOptions::default()
    };
    db.run_gc(vec![input.clone()], options).await;

    let (value, is_blob_index) = db.lsm.get(CF, b"a").unwrap();
    assert!(!is_blob_index);
    assert_eq!(value, Bytes::from_static(b"ten-bytes!"));
    assert!(input.is_obsolete());
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_FALLBACK), 1);
    assert_eq!(db.stat(gc_stats::GC_NUM_OUTPUT_FILES), 0);
}

#[tokio::test]
async fn test_duplicate_versions_rewrite_newest_only() {
    let db = TestDb::in_memory();
    // two files each hold a version of "a"; the LSM points at the newer file
    let (old_input, _) = db.write_blob_file(&[(b"a", b"old-version")]).await;
    let (new_input, _) = db.write_blob_file(&[(b"a", b"new-version")]).await;

    db.run_gc(
        vec![old_input.clone(), new_input.clone()],
        GcOptions::default(),
    )
    .await;

    assert_eq!(db.read_value(b"a").await.unwrap(), Bytes::from_static(b"new-version"));
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 1);
    assert!(old_input.is_obsolete());
    assert!(new_input.is_obsolete());
}

#[tokio::test]
async fn test_gc_twice_is_idempotent() {
    let db = TestDb::in_memory();
    let (input, _) = db.write_blob_file(&[(b"a", b"value-of-a")]).await;

    db.run_gc(vec![input.clone()], GcOptions::default()).await;
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 1);

    // second pass over the collected input finds nothing live
    db.run_gc(vec![input.clone()], GcOptions::default()).await;
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 1);
    assert_eq!(db.stat(gc_stats::GC_NUM_OUTPUT_FILES), 1);
    assert_eq!(db.read_value(b"a").await.unwrap(), Bytes::from_static(b"value-of-a"));
}

#[tokio::test]
async fn test_obsolete_files_survive_manifest_replay() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let db = TestDb::new(store.clone());
    let (input, _) = db.write_blob_file(&[(b"a", b"value-of-a")]).await;
    db.run_gc(vec![input], GcOptions::default()).await;

    let recovered = BlobFileSet::new(
        store,
        "/test_db",
        Arc::new(BlobStorageStats::new(Arc::new(StatRegistry::new()))),
    );
    recovered.recover().await.unwrap();
    let storage = recovered.storage(CF).unwrap();
    // input + output are both known; only the input is obsolete
    assert_eq!(storage.file_count(), 2);
    let obsolete: Vec<bool> = (1..=2)
        .map(|n| storage.find_file(n).unwrap().is_obsolete())
        .collect();
    assert_eq!(obsolete, vec![true, false]);
}

/// Wraps an in-memory store and fails blob-file puts once armed.
#[derive(Debug)]
struct FailingPutStore {
    inner: InMemory,
    fail_blob_puts: AtomicBool,
}

impl FailingPutStore {
    fn new() -> Self {
        Self {
            inner: InMemory::new(),
            fail_blob_puts: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.fail_blob_puts.store(true, Ordering::SeqCst);
    }
}

impl fmt::Display for FailingPutStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailingPutStore({})", self.inner)
    }
}

#[async_trait::async_trait]
impl ObjectStore for FailingPutStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> blobdb::object_store::Result<PutResult> {
        if self.fail_blob_puts.load(Ordering::SeqCst) && location.as_ref().contains("/blob/") {
            return Err(blobdb::object_store::Error::Generic {
                store: "failing_put",
                source: Box::new(std::io::Error::other("injected put failure")),
            });
        }
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOptions,
    ) -> blobdb::object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &Path,
        options: GetOptions,
    ) -> blobdb::object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> blobdb::object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(
        &self,
        prefix: Option<&Path>,
    ) -> BoxStream<'static, blobdb::object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(
        &self,
        prefix: Option<&Path>,
    ) -> blobdb::object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> blobdb::object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> blobdb::object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

#[tokio::test]
async fn test_install_failure_leaves_store_consistent() {
    let store = Arc::new(FailingPutStore::new());
    let db = TestDb::new(store.clone());
    let (input, old_indices) = db.write_blob_file(&[(b"a", b"value-of-a")]).await;

    store.arm();

    let mut job = db.job(vec![input.clone()], GcOptions::default());
    job.prepare().unwrap();
    job.run().await.unwrap();
    let err = job.finish().await.unwrap_err();
    assert!(matches!(err, BlobDbError::ObjectStoreError(_)));
    assert!(job.blob_gc().outputs().is_empty());
    drop(job);

    // the LSM still points at the input record, which is still readable
    let (stored, _) = db.lsm.get(CF, b"a").unwrap();
    assert_eq!(BlobIndex::decode(&stored).unwrap(), old_indices[0]);
    assert_eq!(db.read_value(b"a").await.unwrap(), Bytes::from_static(b"value-of-a"));

    // the input was not retired and no relocation was counted
    assert!(!input.is_obsolete());
    assert_eq!(input.state(), BlobFileState::Normal);
    assert_eq!(db.stat(gc_stats::GC_NUM_KEYS_RELOCATED), 0);
    assert_eq!(db.stat(gc_stats::GC_NUM_OUTPUT_FILES), 0);
    assert_eq!(db.stat(gc_stats::GC_NUM_INPUT_FILES), 0);
}
