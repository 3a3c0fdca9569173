use std::sync::Arc;
use std::sync::Once;

use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tokio_util::sync::CancellationToken;

use crate::blob_file::{BlobFileBuilder, BlobFileMeta};
use crate::blob_file_manager::BlobFileManager;
use crate::blob_file_set::stats::BlobStorageStats;
use crate::blob_file_set::BlobFileSet;
use crate::blob_gc::BlobGc;
use crate::blob_index::BlobIndex;
use crate::config::GcOptions;
use crate::gc_job::stats::GcStats;
use crate::gc_job::BlobGcJob;
use crate::lsm::InMemoryLsm;
use crate::shadow::ShadowSet;
use crate::stats::StatRegistry;

static TRACING_INIT: Once = Once::new();

/// Installs a tracing subscriber honoring `RUST_LOG` so failing tests can be
/// rerun with log output. Safe to call from every test.
pub(crate) fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Writes `data` to the object store and returns its length.
pub(crate) async fn put_blob_object(
    store: &Arc<dyn ObjectStore>,
    path: &Path,
    data: Bytes,
) -> u64 {
    let len = data.len() as u64;
    store
        .put(path, PutPayload::from_bytes(data))
        .await
        .expect("put failed");
    len
}

/// Everything a garbage-collection test needs: an in-memory object store
/// backing the blob side, an in-memory LSM, and a stats registry.
pub(crate) struct GcTestFixture {
    pub(crate) file_set: Arc<BlobFileSet>,
    pub(crate) manager: Arc<BlobFileManager>,
    pub(crate) lsm: Arc<InMemoryLsm>,
    pub(crate) registry: Arc<StatRegistry>,
    pub(crate) stats: Arc<GcStats>,
    pub(crate) storage_stats: Arc<BlobStorageStats>,
    pub(crate) shadow_set: Arc<ShadowSet>,
    pub(crate) shutdown: CancellationToken,
}

impl GcTestFixture {
    pub(crate) fn new() -> Self {
        init_tracing();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let registry = Arc::new(StatRegistry::new());
        let stats = Arc::new(GcStats::new(registry.clone()));
        let storage_stats = Arc::new(BlobStorageStats::new(registry.clone()));
        let file_set = Arc::new(BlobFileSet::new(
            store.clone(),
            "/test_db",
            storage_stats.clone(),
        ));
        let manager = Arc::new(BlobFileManager::new(file_set.clone()));
        let shadow_set = Arc::new(ShadowSet::new(store, "/test_db"));
        Self {
            file_set,
            manager,
            lsm: Arc::new(InMemoryLsm::new()),
            registry,
            stats,
            storage_stats,
            shadow_set,
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds, uploads, and publishes one blob file with the given entries.
    /// Returns the shared meta and the blob index addressing each record.
    pub(crate) async fn install_blob_file(
        &self,
        cf_id: u32,
        entries: &[(&[u8], &[u8])],
    ) -> (Arc<BlobFileMeta>, Vec<BlobIndex>) {
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
            .batch_finish_files(cf_id, &[(handle, builder.finish())])
            .await
            .expect("failed to publish blob file");
        (metas.into_iter().next().expect("no meta"), indices)
    }

    /// Installs a blob file and points the LSM at every record.
    pub(crate) async fn install_referenced_blob_file(
        &self,
        cf_id: u32,
        entries: &[(&[u8], &[u8])],
    ) -> (Arc<BlobFileMeta>, Vec<BlobIndex>) {
        let (meta, indices) = self.install_blob_file(cf_id, entries).await;
        for ((key, _), index) in entries.iter().zip(indices.iter()) {
            self.lsm.put_blob_index(cf_id, key, index);
        }
        (meta, indices)
    }

    pub(crate) fn job(&self, blob_gc: BlobGc) -> BlobGcJob {
        BlobGcJob::new(
            blob_gc,
            self.lsm.clone(),
            self.manager.clone(),
            self.file_set.clone(),
            Some(self.shadow_set.clone()),
            self.shutdown.clone(),
            self.stats.clone(),
        )
    }

    pub(crate) fn gc(
        &self,
        cf_id: u32,
        inputs: Vec<Arc<BlobFileMeta>>,
        options: GcOptions,
    ) -> BlobGc {
        BlobGc::new(cf_id, inputs, options)
    }
}
