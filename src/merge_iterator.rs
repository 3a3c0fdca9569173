use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::blob_file_iter::BlobFileIterator;
use crate::error::BlobDbError;
use crate::types::BlobEntry;

struct MergeIteratorHeapEntry {
    next_entry: BlobEntry,
    iterator: BlobFileIterator,
}

impl Eq for MergeIteratorHeapEntry {}

impl PartialEq<Self> for MergeIteratorHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.next_entry.key == other.next_entry.key
            && self.next_entry.blob_index == other.next_entry.blob_index
    }
}

impl PartialOrd<Self> for MergeIteratorHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeIteratorHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // we'll wrap a Reverse in the BinaryHeap, so the cmp here is in increasing
        // order. The desired behavior is the lowest key first across keys, but
        // the newest version (highest file number) first within a key.
        match self.next_entry.key.cmp(&other.next_entry.key) {
            Ordering::Equal => other
                .next_entry
                .blob_index
                .file_number
                .cmp(&self.next_entry.blob_index.file_number),
            ord => ord,
        }
    }
}

/// Merged forward cursor over a set of blob files.
///
/// Yields entries in ascending user-key order; when the same key appears in
/// multiple inputs, the version from the highest-numbered (newest) file is
/// yielded first. The iterator owns its per-file iterators; dropping it
/// releases all of them.
pub(crate) struct BlobFileMergeIterator {
    heap: BinaryHeap<Reverse<MergeIteratorHeapEntry>>,
    pending_iterators: Vec<BlobFileIterator>,
    initialized: bool,
}

impl BlobFileMergeIterator {
    pub(crate) fn new(iterators: Vec<BlobFileIterator>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending_iterators: iterators,
            initialized: false,
        }
    }

    /// Initializes every per-file iterator and seeds the heap. Idempotent.
    pub(crate) async fn init(&mut self) -> Result<(), BlobDbError> {
        if self.initialized {
            return Ok(());
        }
        for mut iterator in self.pending_iterators.drain(..) {
            iterator.init().await?;
            if let Some(next_entry) = iterator.next_entry().await? {
                self.heap.push(Reverse(MergeIteratorHeapEntry {
                    next_entry,
                    iterator,
                }));
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// Returns the next entry in merge order, or `None` when all inputs are
    /// exhausted. The first underlying read error terminates iteration.
    pub(crate) async fn next_entry(&mut self) -> Result<Option<BlobEntry>, BlobDbError> {
        debug_assert!(self.initialized);
        let Some(Reverse(mut heap_entry)) = self.heap.pop() else {
            return Ok(None);
        };
        let entry = heap_entry.next_entry;
        if let Some(next_entry) = heap_entry.iterator.next_entry().await? {
            heap_entry.next_entry = next_entry;
            self.heap.push(Reverse(heap_entry));
        }
        Ok(Some(entry))
    }
}
