use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors and expected terminal outcomes produced by blobdb.
///
/// A few variants are not failures but classifications the garbage collector
/// reacts to: [`BlobDbError::Busy`] marks a rewrite that lost the race with a
/// foreground writer, [`BlobDbError::ShutdownInProgress`] marks cooperative
/// cancellation, and [`BlobDbError::ColumnFamilyDropped`] aborts rewrites for
/// a column family that no longer exists. Everything else is fatal for the
/// operation that returned it.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum BlobDbError {
    #[error("IO error: {0}")]
    IoError(#[from] Arc<std::io::Error>),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] Arc<object_store::Error>),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid blob file: {msg}")]
    InvalidBlobFile { msg: String },

    #[error("Invalid blob index")]
    InvalidBlobIndex,

    #[error("Invalid version edit: {msg}")]
    InvalidVersionEdit { msg: String },

    #[error("Manifest file already exists")]
    FileVersionExists,

    #[error("Blob file {0} not found")]
    BlobFileMissing(u64),

    #[error("Write conflict: {0}")]
    Busy(&'static str),

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("Column family {0} dropped")]
    ColumnFamilyDropped(u32),

    #[error("Invalid Argument: {msg}")]
    InvalidArgument { msg: String },

    #[error("Unknown configuration file format: {0:?}")]
    UnknownConfigurationFormat(PathBuf),

    #[error("Invalid configuration format: {0}")]
    InvalidConfigurationFormat(#[from] Arc<figment::Error>),
}

impl BlobDbError {
    /// True for rewrites that lost the optimistic race; counted, never fatal.
    pub fn is_busy(&self) -> bool {
        matches!(self, BlobDbError::Busy(_))
    }
}

impl From<std::io::Error> for BlobDbError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(Arc::new(value))
    }
}

impl From<object_store::Error> for BlobDbError {
    fn from(value: object_store::Error) -> Self {
        Self::ObjectStoreError(Arc::new(value))
    }
}

impl From<figment::Error> for BlobDbError {
    fn from(value: figment::Error) -> Self {
        Self::InvalidConfigurationFormat(Arc::new(value))
    }
}
