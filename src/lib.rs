#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]

//! # blobdb
//!
//! The blob-storage side of a key-value store that keeps keys and small
//! index entries in an LSM tree while large values live in append-only blob
//! files. The LSM holds a [`BlobIndex`] per separated value; this crate owns
//! the blob files, their manifest, their liveness accounting, and the
//! garbage collection that rewrites live records out of stale files.
//!
//! The LSM engine itself is a collaborator behind the [`LsmEngine`] trait.
//! Everything persistent goes through an [`object_store::ObjectStore`], so
//! the crate runs against local disk, memory, or any cloud store.
//!
//! The centerpiece is [`BlobGcJob`]: scan a merged iterator over the input
//! blob files, classify each record via the per-file liveness bitset and an
//! authoritative LSM lookup, rewrite the live records into new blob files
//! (or back into the LSM in fallback mode), and install the results with
//! blob files published strictly before the LSM references them.

/// Re-export the bytes crate.
///
/// This is useful for users of the crate who want to use blobdb without
/// having to depend on the bytes crate directly.
pub use bytes;

/// Re-export the object store crate.
///
/// This is useful for users of the crate who want to use blobdb without
/// having to depend on the object store crate directly.
pub use object_store;

pub use blob_file::{BlobFileBuilder, BlobFileMeta, BlobFileState, DiscardableRatioBucket, EncodedBlobFile};
pub use blob_file_manager::{BlobFileHandle, BlobFileManager};
pub use blob_file_set::stats as storage_stats;
pub use blob_file_set::{BlobFileSet, BlobStorage, GcScore};
pub use blob_gc::BlobGc;
pub use blob_index::{BlobHandle, BlobIndex};
pub use config::{BlobRunMode, GcOptions, Settings};
pub use error::BlobDbError;
pub use gc_job::stats as gc_stats;
pub use gc_job::BlobGcJob;
pub use lsm::{InMemoryLsm, LsmEngine, LsmEntry, RewriteOp, WriteCallback};
pub use shadow::{ShadowFileMeta, ShadowSet};
pub use types::BlobEntry;
pub use version_edit::VersionEdit;

pub mod config;
pub mod stats;

mod blob_file;
mod blob_file_iter;
mod blob_file_manager;
mod blob_file_set;
mod blob_gc;
mod blob_index;
mod error;
mod gc_job;
mod liveness;
mod lsm;
mod merge_iterator;
mod paths;
mod shadow;
#[cfg(test)]
mod test_utils;
mod types;
mod utils;
mod version_edit;
mod write_callback;
