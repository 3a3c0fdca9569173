use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::BlobDbError;

/// Encoded size of a [`BlobIndex`]: file number, offset, size, order.
pub(crate) const BLOB_INDEX_ENCODED_SIZE: usize = 8 + 8 + 8 + 4;

/// Position of one record inside a blob file.
///
/// `order` is the zero-based ordinal of the record within the file and doubles
/// as the record's position in the file's liveness bitset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobHandle {
    pub offset: u64,
    pub size: u64,
    pub order: u32,
}

/// The LSM-resident pointer to a value stored in a blob file.
///
/// Two blob indices are equal iff all four fields match; `(file_number,
/// order)` is a stable identity for the record within the file's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlobIndex {
    pub file_number: u64,
    pub blob_handle: BlobHandle,
}

impl BlobIndex {
    /// The empty index (`file_number == 0`) marks a rewrite that reinlines
    /// the value into the LSM instead of pointing at a blob file.
    pub const EMPTY: BlobIndex = BlobIndex {
        file_number: 0,
        blob_handle: BlobHandle {
            offset: 0,
            size: 0,
            order: 0,
        },
    };

    pub fn new(file_number: u64, offset: u64, size: u64, order: u32) -> Self {
        Self {
            file_number,
            blob_handle: BlobHandle {
                offset,
                size,
                order,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_number == 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(BLOB_INDEX_ENCODED_SIZE);
        buf.put_u64(self.file_number);
        buf.put_u64(self.blob_handle.offset);
        buf.put_u64(self.blob_handle.size);
        buf.put_u32(self.blob_handle.order);
        buf.freeze()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlobDbError> {
        if bytes.len() != BLOB_INDEX_ENCODED_SIZE {
            return Err(BlobDbError::InvalidBlobIndex);
        }
        let mut buf = bytes;
        Ok(Self {
            file_number: buf.get_u64(),
            blob_handle: BlobHandle {
                offset: buf.get_u64(),
                size: buf.get_u64(),
                order: buf.get_u32(),
            },
        })
    }
}
