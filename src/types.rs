use bytes::Bytes;

use crate::blob_index::BlobIndex;

/// One record yielded by a blob-file scan: the user key, the record's
/// on-disk address, and the value.
#[derive(Clone, Debug, PartialEq)]
pub struct BlobEntry {
    pub key: Bytes,
    pub blob_index: BlobIndex,
    pub value: Bytes,
}
