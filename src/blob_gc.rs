use std::sync::Arc;

use crate::blob_file::BlobFileMeta;
use crate::config::GcOptions;

/// One garbage-collection work unit as handed to [`crate::BlobGcJob`] by the
/// candidate selector: the column family, the immutable input file set, and
/// the effective options.
///
/// Input files stay `Normal` for the whole job so concurrent readers can keep
/// using them; they only transition to obsolete after their LSM references
/// are gone. Output files accumulate here as they are published.
pub struct BlobGc {
    cf_id: u32,
    inputs: Vec<Arc<BlobFileMeta>>,
    options: GcOptions,
    outputs: Vec<Arc<BlobFileMeta>>,
}

impl BlobGc {
    pub fn new(cf_id: u32, inputs: Vec<Arc<BlobFileMeta>>, options: GcOptions) -> Self {
        Self {
            cf_id,
            inputs,
            options,
            outputs: Vec::new(),
        }
    }

    pub fn cf_id(&self) -> u32 {
        self.cf_id
    }

    pub fn inputs(&self) -> &[Arc<BlobFileMeta>] {
        &self.inputs
    }

    pub fn options(&self) -> &GcOptions {
        &self.options
    }

    pub(crate) fn add_output_file(&mut self, meta: Arc<BlobFileMeta>) {
        self.outputs.push(meta);
    }

    pub fn outputs(&self) -> &[Arc<BlobFileMeta>] {
        &self.outputs
    }

    /// Finds the input file a scanned blob index points into.
    pub(crate) fn find_input(&self, file_number: u64) -> Option<&Arc<BlobFileMeta>> {
        self.inputs
            .iter()
            .find(|meta| meta.file_number() == file_number)
    }
}
