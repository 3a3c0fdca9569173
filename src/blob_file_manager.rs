use std::sync::Arc;

use futures::future::join_all;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, warn};

use crate::blob_file::{BlobFileMeta, EncodedBlobFile};
use crate::blob_file_set::BlobFileSet;
use crate::error::BlobDbError;
use crate::version_edit::VersionEdit;

/// An allocated output blob file that has not been published yet.
#[derive(Clone, Debug)]
pub struct BlobFileHandle {
    pub file_number: u64,
    pub(crate) path: Path,
}

/// Allocates output blob files and publishes or discards them as a batch.
///
/// Publishing is all-or-nothing: either every file in the batch is uploaded,
/// recorded in the manifest, and becomes `Normal`, or everything written so
/// far is deleted and the registry is left untouched.
pub struct BlobFileManager {
    object_store: Arc<dyn ObjectStore>,
    file_set: Arc<BlobFileSet>,
}

impl BlobFileManager {
    pub fn new(file_set: Arc<BlobFileSet>) -> Self {
        Self {
            object_store: file_set.object_store(),
            file_set: file_set.clone(),
        }
    }

    /// Allocates a new output blob file. No I/O happens until the batch is
    /// finished or deleted.
    pub fn new_file(&self) -> BlobFileHandle {
        let file_number = self.file_set.new_file_number();
        BlobFileHandle {
            file_number,
            path: self.file_set.path_resolver().blob_file_path(file_number),
        }
    }

    /// Uploads and publishes a batch of finished output files.
    ///
    /// On success every file is `Normal`, registered in the column family's
    /// storage, and recorded in the manifest; the shared metas are returned.
    /// On failure all objects written by this call are deleted and the error
    /// is returned.
    pub async fn batch_finish_files(
        &self,
        cf_id: u32,
        files: &[(BlobFileHandle, EncodedBlobFile)],
    ) -> Result<Vec<Arc<BlobFileMeta>>, BlobDbError> {
        let mut written: Vec<BlobFileHandle> = Vec::with_capacity(files.len());
        let mut upload_status = Ok(());
        for (handle, encoded) in files {
            debug_assert_eq!(handle.file_number, encoded.file_number);
            match self
                .object_store
                .put(&handle.path, PutPayload::from_bytes(encoded.data.clone()))
                .await
            {
                Ok(_) => written.push(handle.clone()),
                Err(e) => {
                    upload_status = Err(BlobDbError::from(e));
                    break;
                }
            }
        }

        let mut edit = VersionEdit::new(cf_id);
        let metas: Vec<Arc<BlobFileMeta>> = files
            .iter()
            .map(|(_, encoded)| Arc::new(BlobFileMeta::new_gc_output(encoded)))
            .collect();
        for meta in &metas {
            edit.add_blob_file(meta);
        }

        let status = match upload_status {
            Ok(()) => self.file_set.log_and_apply_with_metas(edit, &metas).await,
            Err(e) => Err(e),
        };
        if let Err(e) = status {
            self.batch_delete_files(&written).await?;
            return Err(e);
        }

        for meta in &metas {
            meta.mark_installed();
        }
        Ok(metas)
    }

    /// Deletes unpublished output files. Missing objects are not an error.
    pub async fn batch_delete_files(
        &self,
        handles: &[BlobFileHandle],
    ) -> Result<(), BlobDbError> {
        let deletes = handles.iter().map(|handle| {
            let store = self.object_store.clone();
            async move {
                match store.delete(&handle.path).await {
                    Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                    Err(e) => {
                        warn!(
                            file_number = handle.file_number,
                            "failed to delete unpublished blob file: {}", e
                        );
                        Err(BlobDbError::from(e))
                    }
                }
            }
        });
        for result in join_all(deletes).await {
            result?;
        }
        debug!(count = handles.len(), "deleted unpublished blob files");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_file::{BlobFileBuilder, BlobFileState};
    use crate::blob_file_set::stats::BlobStorageStats;
    use crate::stats::StatRegistry;
    use object_store::memory::InMemory;

    fn encoded_file(file_number: u64) -> EncodedBlobFile {
        let mut builder = BlobFileBuilder::new(file_number);
        builder.add(b"key", b"value");
        builder.finish()
    }

    fn build_file_set(store: Arc<dyn ObjectStore>) -> Arc<BlobFileSet> {
        let registry = Arc::new(StatRegistry::new());
        let stats = Arc::new(BlobStorageStats::new(registry));
        Arc::new(BlobFileSet::new(store, "/db", stats))
    }

    #[tokio::test]
    async fn test_batch_finish_publishes_files() {
        let set = build_file_set(Arc::new(InMemory::new()));
        let manager = BlobFileManager::new(set.clone());

        let h1 = manager.new_file();
        let h2 = manager.new_file();
        assert_ne!(h1.file_number, h2.file_number);

        let files = vec![
            (h1.clone(), encoded_file(h1.file_number)),
            (h2.clone(), encoded_file(h2.file_number)),
        ];
        let metas = manager.batch_finish_files(0, &files).await.unwrap();
        assert_eq!(metas.len(), 2);
        for meta in &metas {
            assert_eq!(meta.state(), BlobFileState::Normal);
        }

        let storage = set.storage(0).unwrap();
        assert_eq!(storage.file_count(), 2);
        // storage holds the same shared metas, not copies
        assert!(Arc::ptr_eq(
            &storage.find_file(h1.file_number).unwrap(),
            &metas[0]
        ));
    }

    #[tokio::test]
    async fn test_batch_delete_ignores_missing_objects() {
        let set = build_file_set(Arc::new(InMemory::new()));
        let manager = BlobFileManager::new(set);
        let handle = manager.new_file();
        manager.batch_delete_files(&[handle]).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_delete_removes_uploaded_objects() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let set = build_file_set(store.clone());
        let manager = BlobFileManager::new(set);

        let handle = manager.new_file();
        let encoded = encoded_file(handle.file_number);
        store
            .put(&handle.path, PutPayload::from_bytes(encoded.data.clone()))
            .await
            .unwrap();

        manager.batch_delete_files(&[handle.clone()]).await.unwrap();
        assert!(matches!(
            store.get(&handle.path).await,
            Err(object_store::Error::NotFound { .. })
        ));
    }
}
