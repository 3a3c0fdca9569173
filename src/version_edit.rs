use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::blob_file::BlobFileMeta;
use crate::error::BlobDbError;

const TAG_ADD_BLOB_FILE: u8 = 1;
const TAG_DELETE_BLOB_FILE: u8 = 2;

/// One record inside a [`VersionEdit`].
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum EditRecord {
    AddBlobFile {
        file_number: u64,
        file_size: u64,
        entry_count: u32,
        live_data_size: u64,
        smallest_key: Bytes,
        largest_key: Bytes,
    },
    DeleteBlobFile {
        file_number: u64,
        /// LSM sequence number at which the file became unreferenced.
        /// Snapshots taken before this sequence may still read from it.
        obsolete_sequence: u64,
    },
}

/// A durable edit to the blob-file manifest: files added (published
/// garbage-collection outputs or foreground flushes) and files marked
/// obsolete.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionEdit {
    pub(crate) cf_id: u32,
    pub(crate) records: Vec<EditRecord>,
}

impl VersionEdit {
    pub fn new(cf_id: u32) -> Self {
        Self {
            cf_id,
            records: Vec::new(),
        }
    }

    pub fn add_blob_file(&mut self, meta: &BlobFileMeta) {
        self.records.push(EditRecord::AddBlobFile {
            file_number: meta.file_number(),
            file_size: meta.file_size(),
            entry_count: meta.entry_count(),
            live_data_size: meta.live_data_size(),
            smallest_key: meta.smallest_key().clone(),
            largest_key: meta.largest_key().clone(),
        });
    }

    pub fn delete_blob_file(&mut self, file_number: u64, obsolete_sequence: u64) {
        self.records.push(EditRecord::DeleteBlobFile {
            file_number,
            obsolete_sequence,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32(self.cf_id);
        buf.put_u32(self.records.len() as u32);
        for record in &self.records {
            match record {
                EditRecord::AddBlobFile {
                    file_number,
                    file_size,
                    entry_count,
                    live_data_size,
                    smallest_key,
                    largest_key,
                } => {
                    buf.put_u8(TAG_ADD_BLOB_FILE);
                    buf.put_u64(*file_number);
                    buf.put_u64(*file_size);
                    buf.put_u32(*entry_count);
                    buf.put_u64(*live_data_size);
                    buf.put_u32(smallest_key.len() as u32);
                    buf.put_slice(smallest_key);
                    buf.put_u32(largest_key.len() as u32);
                    buf.put_slice(largest_key);
                }
                EditRecord::DeleteBlobFile {
                    file_number,
                    obsolete_sequence,
                } => {
                    buf.put_u8(TAG_DELETE_BLOB_FILE);
                    buf.put_u64(*file_number);
                    buf.put_u64(*obsolete_sequence);
                }
            }
        }
        let checksum = crc32fast::hash(&buf);
        buf.put_u32(checksum);
        buf.freeze()
    }

    pub(crate) fn decode(bytes: &Bytes) -> Result<Self, BlobDbError> {
        let invalid = |msg: &str| BlobDbError::InvalidVersionEdit {
            msg: msg.to_string(),
        };
        if bytes.len() < 12 {
            return Err(invalid("edit too short"));
        }
        let checksum_offset = bytes.len() - 4;
        let expected = (&bytes[checksum_offset..]).get_u32();
        if crc32fast::hash(&bytes[..checksum_offset]) != expected {
            return Err(BlobDbError::ChecksumMismatch);
        }
        let mut buf = bytes.slice(..checksum_offset);
        let cf_id = buf.get_u32();
        let record_count = buf.get_u32() as usize;
        let mut records = Vec::with_capacity(record_count);
        for _ in 0..record_count {
            if buf.remaining() < 1 {
                return Err(invalid("truncated record"));
            }
            match buf.get_u8() {
                TAG_ADD_BLOB_FILE => {
                    if buf.remaining() < 8 + 8 + 4 + 8 + 4 {
                        return Err(invalid("truncated add-file record"));
                    }
                    let file_number = buf.get_u64();
                    let file_size = buf.get_u64();
                    let entry_count = buf.get_u32();
                    let live_data_size = buf.get_u64();
                    let smallest_len = buf.get_u32() as usize;
                    if buf.remaining() < smallest_len + 4 {
                        return Err(invalid("truncated add-file key range"));
                    }
                    let smallest_key = buf.copy_to_bytes(smallest_len);
                    let largest_len = buf.get_u32() as usize;
                    if buf.remaining() < largest_len {
                        return Err(invalid("truncated add-file key range"));
                    }
                    let largest_key = buf.copy_to_bytes(largest_len);
                    records.push(EditRecord::AddBlobFile {
                        file_number,
                        file_size,
                        entry_count,
                        live_data_size,
                        smallest_key,
                        largest_key,
                    });
                }
                TAG_DELETE_BLOB_FILE => {
                    if buf.remaining() < 16 {
                        return Err(invalid("truncated delete-file record"));
                    }
                    records.push(EditRecord::DeleteBlobFile {
                        file_number: buf.get_u64(),
                        obsolete_sequence: buf.get_u64(),
                    });
                }
                tag => {
                    return Err(BlobDbError::InvalidVersionEdit {
                        msg: format!("unknown record tag {}", tag),
                    })
                }
            }
        }
        if buf.has_remaining() {
            return Err(invalid("trailing bytes"));
        }
        Ok(Self { cf_id, records })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let mut edit = VersionEdit::new(3);
        edit.records.push(EditRecord::AddBlobFile {
            file_number: 10,
            file_size: 2048,
            entry_count: 5,
            live_data_size: 1900,
            smallest_key: Bytes::from_static(b"aaa"),
            largest_key: Bytes::from_static(b"zzz"),
        });
        edit.delete_blob_file(4, 99);
        edit.delete_blob_file(5, 99);

        let decoded = VersionEdit::decode(&edit.encode()).unwrap();
        assert_eq!(decoded, edit);
    }

    #[test]
    fn test_decode_detects_corruption() {
        let mut edit = VersionEdit::new(1);
        edit.delete_blob_file(4, 99);
        let mut bytes = edit.encode().to_vec();
        bytes[6] ^= 0xff;
        assert!(VersionEdit::decode(&Bytes::from(bytes)).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let mut buf = BytesMut::new();
        buf.put_u32(1); // cf_id
        buf.put_u32(1); // record count
        buf.put_u8(99); // bogus tag
        let checksum = crc32fast::hash(&buf);
        buf.put_u32(checksum);
        assert!(matches!(
            VersionEdit::decode(&buf.freeze()),
            Err(BlobDbError::InvalidVersionEdit { .. })
        ));
    }

    #[test]
    fn test_empty_edit() {
        let edit = VersionEdit::new(0);
        assert!(edit.is_empty());
        let decoded = VersionEdit::decode(&edit.encode()).unwrap();
        assert!(decoded.records.is_empty());
    }
}
