use crate::blob_file::DiscardableRatioBucket;
use crate::stats::{Gauge, StatRegistry};
use std::sync::Arc;

macro_rules! storage_stat_name {
    ($suffix:expr) => {
        crate::stat_name!("blob_storage", $suffix)
    };
}

pub const FILES_DISCARDABLE_RATIO_LE0: &str = storage_stat_name!("files_discardable_ratio_le0");
pub const FILES_DISCARDABLE_RATIO_LE20: &str = storage_stat_name!("files_discardable_ratio_le20");
pub const FILES_DISCARDABLE_RATIO_LE50: &str = storage_stat_name!("files_discardable_ratio_le50");
pub const FILES_DISCARDABLE_RATIO_LE80: &str = storage_stat_name!("files_discardable_ratio_le80");
pub const FILES_DISCARDABLE_RATIO_LE100: &str = storage_stat_name!("files_discardable_ratio_le100");

/// Gauges describing the registered, non-obsolete blob-file population,
/// bucketed by discardable ratio.
///
/// A file is counted into its bucket when it is registered (publish or
/// manifest replay), moved between buckets when garbage collection corrects
/// its liveness, and released when it is marked obsolete. The sum of the
/// five gauges therefore equals the number of collectable files.
pub struct BlobStorageStats {
    pub files_discardable_ratio_le0: Arc<Gauge<i64>>,
    pub files_discardable_ratio_le20: Arc<Gauge<i64>>,
    pub files_discardable_ratio_le50: Arc<Gauge<i64>>,
    pub files_discardable_ratio_le80: Arc<Gauge<i64>>,
    pub files_discardable_ratio_le100: Arc<Gauge<i64>>,
}

impl BlobStorageStats {
    pub fn new(registry: Arc<StatRegistry>) -> Self {
        let stats = Self {
            files_discardable_ratio_le0: Arc::new(Gauge::default()),
            files_discardable_ratio_le20: Arc::new(Gauge::default()),
            files_discardable_ratio_le50: Arc::new(Gauge::default()),
            files_discardable_ratio_le80: Arc::new(Gauge::default()),
            files_discardable_ratio_le100: Arc::new(Gauge::default()),
        };
        registry.register(
            FILES_DISCARDABLE_RATIO_LE0,
            stats.files_discardable_ratio_le0.clone(),
        );
        registry.register(
            FILES_DISCARDABLE_RATIO_LE20,
            stats.files_discardable_ratio_le20.clone(),
        );
        registry.register(
            FILES_DISCARDABLE_RATIO_LE50,
            stats.files_discardable_ratio_le50.clone(),
        );
        registry.register(
            FILES_DISCARDABLE_RATIO_LE80,
            stats.files_discardable_ratio_le80.clone(),
        );
        registry.register(
            FILES_DISCARDABLE_RATIO_LE100,
            stats.files_discardable_ratio_le100.clone(),
        );
        stats
    }

    /// The gauge counting files currently in `bucket`.
    pub fn bucket_gauge(&self, bucket: DiscardableRatioBucket) -> &Arc<Gauge<i64>> {
        match bucket {
            DiscardableRatioBucket::Le0 => &self.files_discardable_ratio_le0,
            DiscardableRatioBucket::Le20 => &self.files_discardable_ratio_le20,
            DiscardableRatioBucket::Le50 => &self.files_discardable_ratio_le50,
            DiscardableRatioBucket::Le80 => &self.files_discardable_ratio_le80,
            DiscardableRatioBucket::Le100 => &self.files_discardable_ratio_le100,
        }
    }
}
