use crate::stats::{Counter, StatRegistry};
use std::sync::Arc;

macro_rules! gc_stat_name {
    ($suffix:expr) => {
        crate::stat_name!("gc", $suffix)
    };
}

pub const GC_JOB_COUNT: &str = gc_stat_name!("job_count");
pub const GC_BYTES_READ_BLOB: &str = gc_stat_name!("bytes_read_blob");
pub const GC_BYTES_READ_CHECK: &str = gc_stat_name!("bytes_read_check");
pub const GC_BYTES_READ_CALLBACK: &str = gc_stat_name!("bytes_read_callback");
pub const GC_BYTES_WRITTEN_BLOB: &str = gc_stat_name!("bytes_written_blob");
pub const GC_BYTES_WRITTEN_LSM: &str = gc_stat_name!("bytes_written_lsm");
pub const GC_NUM_KEYS_OVERWRITTEN_CHECK: &str = gc_stat_name!("num_keys_overwritten_check");
pub const GC_NUM_KEYS_OVERWRITTEN_CALLBACK: &str = gc_stat_name!("num_keys_overwritten_callback");
pub const GC_BYTES_OVERWRITTEN_CHECK: &str = gc_stat_name!("bytes_overwritten_check");
pub const GC_BYTES_OVERWRITTEN_CALLBACK: &str = gc_stat_name!("bytes_overwritten_callback");
pub const GC_NUM_KEYS_RELOCATED: &str = gc_stat_name!("num_keys_relocated");
pub const GC_BYTES_RELOCATED: &str = gc_stat_name!("bytes_relocated");
pub const GC_NUM_KEYS_FALLBACK: &str = gc_stat_name!("num_keys_fallback");
pub const GC_BYTES_FALLBACK: &str = gc_stat_name!("bytes_fallback");
pub const GC_NUM_INPUT_FILES: &str = gc_stat_name!("num_input_files");
pub const GC_NUM_OUTPUT_FILES: &str = gc_stat_name!("num_output_files");
pub const GC_INPUT_FILE_BYTES: &str = gc_stat_name!("input_file_bytes");
pub const GC_OUTPUT_FILE_BYTES: &str = gc_stat_name!("output_file_bytes");
pub const GC_READ_LSM_MICROS: &str = gc_stat_name!("read_lsm_micros");
pub const GC_UPDATE_LSM_MICROS: &str = gc_stat_name!("update_lsm_micros");

/// Stats published by garbage-collection jobs.
///
/// Per-job metrics accumulate in the job and are added here when the job is
/// dropped, so counters reflect whole jobs even on failure paths.
pub struct GcStats {
    pub gc_job_count: Arc<Counter>,
    pub gc_bytes_read_blob: Arc<Counter>,
    pub gc_bytes_read_check: Arc<Counter>,
    pub gc_bytes_read_callback: Arc<Counter>,
    pub gc_bytes_written_blob: Arc<Counter>,
    pub gc_bytes_written_lsm: Arc<Counter>,
    pub gc_num_keys_overwritten_check: Arc<Counter>,
    pub gc_num_keys_overwritten_callback: Arc<Counter>,
    pub gc_bytes_overwritten_check: Arc<Counter>,
    pub gc_bytes_overwritten_callback: Arc<Counter>,
    pub gc_num_keys_relocated: Arc<Counter>,
    pub gc_bytes_relocated: Arc<Counter>,
    pub gc_num_keys_fallback: Arc<Counter>,
    pub gc_bytes_fallback: Arc<Counter>,
    pub gc_num_input_files: Arc<Counter>,
    pub gc_num_output_files: Arc<Counter>,
    pub gc_input_file_bytes: Arc<Counter>,
    pub gc_output_file_bytes: Arc<Counter>,
    pub gc_read_lsm_micros: Arc<Counter>,
    pub gc_update_lsm_micros: Arc<Counter>,
}

impl GcStats {
    pub fn new(registry: Arc<StatRegistry>) -> Self {
        let stats = Self {
            gc_job_count: Arc::new(Counter::default()),
            gc_bytes_read_blob: Arc::new(Counter::default()),
            gc_bytes_read_check: Arc::new(Counter::default()),
            gc_bytes_read_callback: Arc::new(Counter::default()),
            gc_bytes_written_blob: Arc::new(Counter::default()),
            gc_bytes_written_lsm: Arc::new(Counter::default()),
            gc_num_keys_overwritten_check: Arc::new(Counter::default()),
            gc_num_keys_overwritten_callback: Arc::new(Counter::default()),
            gc_bytes_overwritten_check: Arc::new(Counter::default()),
            gc_bytes_overwritten_callback: Arc::new(Counter::default()),
            gc_num_keys_relocated: Arc::new(Counter::default()),
            gc_bytes_relocated: Arc::new(Counter::default()),
            gc_num_keys_fallback: Arc::new(Counter::default()),
            gc_bytes_fallback: Arc::new(Counter::default()),
            gc_num_input_files: Arc::new(Counter::default()),
            gc_num_output_files: Arc::new(Counter::default()),
            gc_input_file_bytes: Arc::new(Counter::default()),
            gc_output_file_bytes: Arc::new(Counter::default()),
            gc_read_lsm_micros: Arc::new(Counter::default()),
            gc_update_lsm_micros: Arc::new(Counter::default()),
        };
        registry.register(GC_JOB_COUNT, stats.gc_job_count.clone());
        registry.register(GC_BYTES_READ_BLOB, stats.gc_bytes_read_blob.clone());
        registry.register(GC_BYTES_READ_CHECK, stats.gc_bytes_read_check.clone());
        registry.register(GC_BYTES_READ_CALLBACK, stats.gc_bytes_read_callback.clone());
        registry.register(GC_BYTES_WRITTEN_BLOB, stats.gc_bytes_written_blob.clone());
        registry.register(GC_BYTES_WRITTEN_LSM, stats.gc_bytes_written_lsm.clone());
        registry.register(
            GC_NUM_KEYS_OVERWRITTEN_CHECK,
            stats.gc_num_keys_overwritten_check.clone(),
        );
        registry.register(
            GC_NUM_KEYS_OVERWRITTEN_CALLBACK,
            stats.gc_num_keys_overwritten_callback.clone(),
        );
        registry.register(
            GC_BYTES_OVERWRITTEN_CHECK,
            stats.gc_bytes_overwritten_check.clone(),
        );
        registry.register(
            GC_BYTES_OVERWRITTEN_CALLBACK,
            stats.gc_bytes_overwritten_callback.clone(),
        );
        registry.register(GC_NUM_KEYS_RELOCATED, stats.gc_num_keys_relocated.clone());
        registry.register(GC_BYTES_RELOCATED, stats.gc_bytes_relocated.clone());
        registry.register(GC_NUM_KEYS_FALLBACK, stats.gc_num_keys_fallback.clone());
        registry.register(GC_BYTES_FALLBACK, stats.gc_bytes_fallback.clone());
        registry.register(GC_NUM_INPUT_FILES, stats.gc_num_input_files.clone());
        registry.register(GC_NUM_OUTPUT_FILES, stats.gc_num_output_files.clone());
        registry.register(GC_INPUT_FILE_BYTES, stats.gc_input_file_bytes.clone());
        registry.register(GC_OUTPUT_FILE_BYTES, stats.gc_output_file_bytes.clone());
        registry.register(GC_READ_LSM_MICROS, stats.gc_read_lsm_micros.clone());
        registry.register(GC_UPDATE_LSM_MICROS, stats.gc_update_lsm_micros.clone());
        stats
    }
}
