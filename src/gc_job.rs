//! The blob garbage-collection job.
//!
//! A job is a short-lived workflow over an immutable input set of blob files:
//! scan a merged iterator over the inputs, classify each record as live or
//! discardable (liveness bitset first, then an authoritative LSM lookup),
//! rewrite the live records, and install the results. Install is two-phase:
//! output blob files are published before the LSM learns about them, so a
//! crash in between can orphan unreferenced files but never leaves the LSM
//! pointing at a blob that does not exist.
//!
//! Rewrites race with foreground writers. Each queued LSM update carries an
//! optimistic write callback that re-verifies the key's blob index at commit
//! time; lost races surface as `Busy`, are counted, and feed the output
//! file's liveness accounting so the stale record is immediately known to be
//! garbage.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::blob_file::{BlobFileBuilder, BlobFileState, EncodedBlobFile};
use crate::blob_file_iter::BlobFileIterator;
use crate::blob_file_manager::{BlobFileHandle, BlobFileManager};
use crate::blob_file_set::{BlobFileSet, BlobStorage};
use crate::blob_gc::BlobGc;
use crate::blob_index::BlobIndex;
use crate::config::BlobRunMode;
use crate::error::BlobDbError;
use crate::lsm::{LsmEngine, RewriteOp};
use crate::merge_iterator::BlobFileMergeIterator;
use crate::shadow::{EncodedShadowFile, ShadowSet, ShadowSstBuilder, MAX_SHADOW_LEVELS};
use crate::types::BlobEntry;
use crate::write_callback::GcWriteCallback;

pub mod stats;

use stats::GcStats;

/// Where live records' new indices go: through the LSM write path, or into
/// side-car shadow files. Fixed at job construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RewriteTarget {
    Lsm,
    Shadow,
}

/// Per-job metric accumulators, published to [`GcStats`] when the job is
/// dropped. Monotonic within a job.
#[derive(Debug, Default)]
pub(crate) struct GcJobMetrics {
    pub(crate) gc_bytes_read_blob: u64,
    pub(crate) gc_bytes_read_check: u64,
    pub(crate) gc_bytes_read_callback: u64,
    pub(crate) gc_bytes_written_blob: u64,
    pub(crate) gc_bytes_written_lsm: u64,
    pub(crate) gc_num_keys_overwritten_check: u64,
    pub(crate) gc_num_keys_overwritten_callback: u64,
    pub(crate) gc_bytes_overwritten_check: u64,
    pub(crate) gc_bytes_overwritten_callback: u64,
    pub(crate) gc_num_keys_relocated: u64,
    pub(crate) gc_bytes_relocated: u64,
    pub(crate) gc_num_keys_fallback: u64,
    pub(crate) gc_bytes_fallback: u64,
    pub(crate) gc_num_input_files: u64,
    pub(crate) gc_num_output_files: u64,
    pub(crate) gc_input_file_bytes: u64,
    pub(crate) gc_output_file_bytes: u64,
    pub(crate) gc_read_lsm_micros: u64,
    pub(crate) gc_update_lsm_micros: u64,
}

/// A pending LSM rewrite: the single-key op plus the optimistic callback
/// that gates it at commit time.
struct RewriteBatch {
    op: RewriteOp,
    callback: GcWriteCallback,
}

/// Executes one garbage-collection work unit.
///
/// The phases must be called in order: [`BlobGcJob::prepare`], then
/// [`BlobGcJob::run`], then [`BlobGcJob::finish`]. Any non-OK status
/// short-circuits the rest; the metric flush on drop always runs.
pub struct BlobGcJob {
    blob_gc: BlobGc,
    lsm: Arc<dyn LsmEngine>,
    blob_file_manager: Arc<BlobFileManager>,
    blob_file_set: Arc<BlobFileSet>,
    shadow_set: Option<Arc<ShadowSet>>,
    shutdown: CancellationToken,
    stats: Arc<GcStats>,
    metrics: GcJobMetrics,
    rewrite_target: RewriteTarget,
    rewrite_batches: Vec<RewriteBatch>,
    finished_files: Vec<(BlobFileHandle, EncodedBlobFile)>,
    finished_shadows: Vec<EncodedShadowFile>,
    prepared: bool,
    ran: bool,
}

impl BlobGcJob {
    pub fn new(
        blob_gc: BlobGc,
        lsm: Arc<dyn LsmEngine>,
        blob_file_manager: Arc<BlobFileManager>,
        blob_file_set: Arc<BlobFileSet>,
        shadow_set: Option<Arc<ShadowSet>>,
        shutdown: CancellationToken,
        stats: Arc<GcStats>,
    ) -> Self {
        let rewrite_target = if blob_gc.options().rewrite_shadow {
            RewriteTarget::Shadow
        } else {
            RewriteTarget::Lsm
        };
        Self {
            blob_gc,
            lsm,
            blob_file_manager,
            blob_file_set,
            shadow_set,
            shutdown,
            stats,
            metrics: GcJobMetrics::default(),
            rewrite_target,
            rewrite_batches: Vec::new(),
            finished_files: Vec::new(),
            finished_shadows: Vec::new(),
            prepared: false,
            ran: false,
        }
    }

    /// Validates the input set and records the job's starting point. Must be
    /// called once before [`BlobGcJob::run`].
    pub fn prepare(&mut self) -> Result<(), BlobDbError> {
        if self.prepared {
            return Err(BlobDbError::InvalidArgument {
                msg: "prepare called twice".to_string(),
            });
        }
        if self.rewrite_target == RewriteTarget::Shadow {
            if self.shadow_set.is_none() {
                return Err(BlobDbError::InvalidArgument {
                    msg: "rewrite_shadow requires a shadow set".to_string(),
                });
            }
            // Fallback rewrites carry no blob index, so they have nothing to
            // put in a shadow file; the two modes cannot be combined.
            if self.blob_gc.options().blob_run_mode == BlobRunMode::Fallback {
                return Err(BlobDbError::InvalidArgument {
                    msg: "rewrite_shadow is incompatible with fallback run mode".to_string(),
                });
            }
        }
        let mut seen = BTreeSet::new();
        for input in self.blob_gc.inputs() {
            // Unpublished outputs can never be GC inputs. Obsolete inputs are
            // tolerated: re-running over an already-collected set degrades to
            // a no-op.
            if input.state() == BlobFileState::PendingGcOutput {
                return Err(BlobDbError::InvalidArgument {
                    msg: format!(
                        "input blob file {} is an unpublished GC output",
                        input.file_number()
                    ),
                });
            }
            if !seen.insert(input.file_number()) {
                return Err(BlobDbError::InvalidArgument {
                    msg: format!("duplicate input blob file {}", input.file_number()),
                });
            }
        }
        debug!(
            cf_id = self.blob_gc.cf_id(),
            candidates = ?seen,
            "GC candidates"
        );
        self.prepared = true;
        Ok(())
    }

    /// Executes the scan/filter/rewrite pipeline.
    pub async fn run(&mut self) -> Result<(), BlobDbError> {
        if !self.prepared {
            return Err(BlobDbError::InvalidArgument {
                msg: "run called before prepare".to_string(),
            });
        }
        self.ran = true;

        let total_size: u64 = self.blob_gc.inputs().iter().map(|f| f.file_size()).sum();
        let total_live: u64 = self
            .blob_gc
            .inputs()
            .iter()
            .map(|f| f.live_data_size())
            .sum();
        info!(
            cf_id = self.blob_gc.cf_id(),
            files = self.blob_gc.inputs().len(),
            bytes = total_size,
            live_bytes = total_live,
            garbage_bytes = total_size - total_live.min(total_size),
            "GC job start"
        );

        let mut gc_iter = self.build_iterator();
        gc_iter.init().await?;
        self.scan_and_rewrite(&mut gc_iter).await
    }

    fn build_iterator(&self) -> BlobFileMergeIterator {
        let store = self.blob_file_set.object_store();
        let paths = self.blob_file_set.path_resolver();
        let iterators = self
            .blob_gc
            .inputs()
            .iter()
            .map(|input| {
                BlobFileIterator::new(
                    store.clone(),
                    paths.blob_file_path(input.file_number()),
                    input.file_number(),
                    input.file_size(),
                )
            })
            .collect();
        BlobFileMergeIterator::new(iterators)
    }

    async fn scan_and_rewrite(
        &mut self,
        gc_iter: &mut BlobFileMergeIterator,
    ) -> Result<(), BlobDbError> {
        let cf_id = self.blob_gc.cf_id();
        let target_size = self.blob_gc.options().blob_file_target_size;
        let shadow_target_size = self.blob_gc.options().shadow_target_size;
        let fallback = self.blob_gc.options().blob_run_mode == BlobRunMode::Fallback;

        let mut blob_file_builder: Option<(BlobFileHandle, BlobFileBuilder)> = None;
        let mut shadow_builders: Vec<Option<ShadowSstBuilder>> =
            (0..MAX_SHADOW_LEVELS).map(|_| None).collect();

        let mut last_key = Bytes::new();
        let mut last_key_is_fresh = false;
        let mut total_count: u64 = 0;
        let mut discardable_count: u64 = 0;
        let mut valid_count: u64 = 0;
        let mut skipped_count: u64 = 0;

        let mut status = Ok(());
        while let Some(entry) = gc_iter.next_entry().await? {
            if self.shutdown.is_cancelled() {
                status = Err(BlobDbError::ShutdownInProgress);
                break;
            }
            total_count += 1;
            self.metrics.gc_bytes_read_blob += entry.blob_index.blob_handle.size;

            if !last_key.is_empty() && entry.key == last_key {
                if last_key_is_fresh {
                    // Only the newest version is rewritten. Blob files holding
                    // the older versions stay readable for snapshots that
                    // still reference them.
                    skipped_count += 1;
                    continue;
                }
            } else {
                last_key = entry.key.clone();
                last_key_is_fresh = false;
            }

            let check_start = Instant::now();
            let mut level = None;
            let mut discardable = !self.is_live_by_bitset(&entry.blob_index)?;
            if !discardable {
                // Maybe valid; ask the LSM, which also tells us the level of
                // a valid key.
                (discardable, level) = self.discard_entry(&entry).await?;
            }
            self.metrics.gc_read_lsm_micros += check_start.elapsed().as_micros() as u64;

            if discardable {
                if level == Some(0) {
                    debug!(key = ?entry.key, "discardable key found at level 0");
                }
                self.metrics.gc_num_keys_overwritten_check += 1;
                self.metrics.gc_bytes_overwritten_check += entry.blob_index.blob_handle.size;
                discardable_count += 1;
                continue;
            }
            valid_count += 1;
            last_key_is_fresh = true;

            if fallback {
                let callback = GcWriteCallback::new(
                    cf_id,
                    entry.key.clone(),
                    entry.blob_index,
                    BlobIndex::EMPTY,
                );
                self.rewrite_batches.push(RewriteBatch {
                    op: RewriteOp::PutValue {
                        key: entry.key,
                        value: entry.value,
                    },
                    callback,
                });
                continue;
            }

            // Rewrite the record into the current output blob file, rolling
            // when the target size is reached.
            let needs_roll = blob_file_builder
                .as_ref()
                .map_or(true, |(_, b)| b.current_size() >= target_size);
            if needs_roll {
                if let Some((handle, builder)) = blob_file_builder.take() {
                    self.finished_files.push((handle, builder.finish()));
                }
                let handle = self.blob_file_manager.new_file();
                info!(file_number = handle.file_number, "new GC output file");
                let builder = BlobFileBuilder::new(handle.file_number);
                blob_file_builder = Some((handle, builder));
            }
            let Some((_, builder)) = blob_file_builder.as_mut() else {
                return Err(BlobDbError::InvalidArgument {
                    msg: "output builder missing".to_string(),
                });
            };
            let new_handle = builder.add(&entry.key, &entry.value);
            self.metrics.gc_bytes_written_blob += new_handle.size;
            let new_blob_index = BlobIndex {
                file_number: builder.file_number(),
                blob_handle: new_handle,
            };

            match self.rewrite_target {
                RewriteTarget::Shadow => {
                    let level = (level.unwrap_or(0) as usize).min(MAX_SHADOW_LEVELS - 1);
                    status = self.add_to_shadow(
                        &mut shadow_builders,
                        level,
                        &entry.key,
                        &new_blob_index,
                        shadow_target_size,
                    );
                    if status.is_err() {
                        break;
                    }
                }
                RewriteTarget::Lsm => {
                    let callback = GcWriteCallback::new(
                        cf_id,
                        entry.key.clone(),
                        entry.blob_index,
                        new_blob_index,
                    );
                    self.rewrite_batches.push(RewriteBatch {
                        op: RewriteOp::PutBlobIndex {
                            key: entry.key,
                            index: new_blob_index,
                        },
                        callback,
                    });
                }
            }
        }

        info!(
            cf_id,
            total_count, valid_count, discardable_count, skipped_count, "GC scan finished"
        );
        debug_assert_eq!(
            total_count,
            valid_count + discardable_count + skipped_count
        );

        status?;

        if let Some((handle, builder)) = blob_file_builder.take() {
            if builder.entry_count() > 0 {
                self.finished_files.push((handle, builder.finish()));
            }
        }
        for builder in shadow_builders.iter_mut() {
            if let Some(builder) = builder.take() {
                if builder.entry_count() > 0 {
                    self.finished_shadows.push(builder.finish());
                }
            }
        }
        Ok(())
    }

    /// Fast-path liveness check against the source file's bitset. A cleared
    /// bit is authoritative; a set bit still needs the LSM check.
    fn is_live_by_bitset(&self, blob_index: &BlobIndex) -> Result<bool, BlobDbError> {
        let file = self
            .blob_gc
            .find_input(blob_index.file_number)
            .ok_or(BlobDbError::BlobFileMissing(blob_index.file_number))?;
        Ok(file.is_live(blob_index.blob_handle.order))
    }

    /// Authoritative liveness check: the record is discardable unless the LSM
    /// still maps its key to exactly the scanned blob index. Returns the LSM
    /// level of a valid key.
    async fn discard_entry(
        &mut self,
        entry: &BlobEntry,
    ) -> Result<(bool, Option<u32>), BlobDbError> {
        let lookup = self
            .lsm
            .get_blob_index_entry(self.blob_gc.cf_id(), &entry.key)
            .await?;
        self.metrics.gc_bytes_read_check +=
            (entry.key.len() + lookup.as_ref().map_or(0, |e| e.value.len())) as u64;
        let Some(lookup) = lookup else {
            // Deleted, or updated with a newer version that is inlined in the
            // LSM. The bitset saying live is just staleness.
            return Ok((true, None));
        };
        if lookup.level == 0 {
            debug!(key = ?entry.key, "GC lookup hit level 0");
        }
        if !lookup.is_blob_index {
            return Ok((true, Some(lookup.level)));
        }
        let other_blob_index = BlobIndex::decode(&lookup.value)?;
        Ok((
            other_blob_index != entry.blob_index,
            Some(lookup.level),
        ))
    }

    fn add_to_shadow(
        &mut self,
        builders: &mut [Option<ShadowSstBuilder>],
        level: usize,
        key: &[u8],
        index: &BlobIndex,
        shadow_target_size: u64,
    ) -> Result<(), BlobDbError> {
        let shadow_set = self
            .shadow_set
            .as_ref()
            .ok_or_else(|| BlobDbError::InvalidArgument {
                msg: "rewrite_shadow requires a shadow set".to_string(),
            })?;
        if builders[level].is_none() {
            let file_number = shadow_set.new_file_number();
            info!(file_number, level, "new GC shadow file");
            builders[level] = Some(ShadowSstBuilder::new(file_number, level));
        }
        let builder = builders[level].as_mut().ok_or_else(|| {
            BlobDbError::InvalidArgument {
                msg: "shadow builder missing".to_string(),
            }
        })?;
        builder.add(key, index);
        if builder.estimated_size() >= shadow_target_size {
            if let Some(builder) = builders[level].take() {
                self.finished_shadows.push(builder.finish());
            }
        }
        Ok(())
    }

    /// Executes the install/commit protocol.
    ///
    /// Output blob files publish first (all-or-nothing); only then are live
    /// keys rewritten, the WAL synced, and the input files marked obsolete.
    /// The blob manifest and the LSM manifest are independent, so this order
    /// is what keeps a crash between them from leaving the LSM pointing at an
    /// unpublished blob file.
    pub async fn finish(&mut self) -> Result<(), BlobDbError> {
        if !self.ran {
            return Err(BlobDbError::InvalidArgument {
                msg: "finish called before run".to_string(),
            });
        }
        if self.shutdown.is_cancelled() {
            // Nothing has been published yet; dropping the encoded outputs
            // releases them.
            return Err(BlobDbError::ShutdownInProgress);
        }

        let mut status = self.install_output_blob_files().await;
        if status.is_ok() {
            status = match self.rewrite_target {
                RewriteTarget::Lsm => self.rewrite_valid_keys_to_lsm().await,
                RewriteTarget::Shadow => self.install_output_shadows().await,
            };
            if let Err(e) = &status {
                error!(cf_id = self.blob_gc.cf_id(), "GC job failed to rewrite keys: {}", e);
            }
        } else if let Err(e) = &status {
            error!(
                cf_id = self.blob_gc.cf_id(),
                "GC job failed to install output blob files: {}", e
            );
        }

        let cf_dropped = self
            .blob_file_set
            .storage(self.blob_gc.cf_id())
            .map_or(true, |storage| storage.is_dropped());
        if status.is_ok() && !cf_dropped {
            status = self.delete_input_blob_files().await;
        }
        status
    }

    /// Step 1: upload and publish every finished output file, or delete them
    /// all and fail.
    async fn install_output_blob_files(&mut self) -> Result<(), BlobDbError> {
        if self.finished_files.is_empty() {
            return Ok(());
        }
        let files = std::mem::take(&mut self.finished_files);
        let metas = self
            .blob_file_manager
            .batch_finish_files(self.blob_gc.cf_id(), &files)
            .await?;
        let output_numbers: Vec<u64> = metas.iter().map(|m| m.file_number()).collect();
        info!(
            cf_id = self.blob_gc.cf_id(),
            outputs = ?output_numbers,
            "GC outputs installed"
        );
        for meta in metas {
            self.metrics.gc_num_output_files += 1;
            self.metrics.gc_output_file_bytes += meta.file_size();
            self.blob_gc.add_output_file(meta);
        }
        Ok(())
    }

    /// Step 2 (LSM target): commit each rewrite through its callback, then
    /// apply dropped-bit accounting for lost races and sync the WAL.
    async fn rewrite_valid_keys_to_lsm(&mut self) -> Result<(), BlobDbError> {
        let update_start = Instant::now();
        let cf_id = self.blob_gc.cf_id();
        let storage = self.blob_file_set.storage_or_create(cf_id);

        // output file number -> (dropped bytes, dropped orders)
        let mut dropped: HashMap<u64, (u64, BTreeSet<u32>)> = HashMap::new();
        let mut status = Ok(());
        for batch in self.rewrite_batches.iter_mut() {
            if storage.is_dropped() {
                status = Err(BlobDbError::ColumnFamilyDropped(cf_id));
                break;
            }
            if self.shutdown.is_cancelled() {
                status = Err(BlobDbError::ShutdownInProgress);
                break;
            }
            let result = self
                .lsm
                .write_with_callback(cf_id, &batch.op, &mut batch.callback)
                .await;
            let new_blob_index = *batch.callback.new_blob_index();
            match result {
                Ok(()) => {
                    if !new_blob_index.is_empty() {
                        // Rewritten as a blob record.
                        self.metrics.gc_bytes_written_lsm += batch.op.data_size();
                        self.metrics.gc_num_keys_relocated += 1;
                        self.metrics.gc_bytes_relocated += batch.callback.blob_record_size();
                    } else {
                        // Rewritten as an inline value due to fallback mode.
                        self.metrics.gc_num_keys_fallback += 1;
                        self.metrics.gc_bytes_fallback += batch.callback.blob_record_size();
                    }
                }
                Err(e) if e.is_busy() => {
                    self.metrics.gc_num_keys_overwritten_callback += 1;
                    self.metrics.gc_bytes_overwritten_callback +=
                        batch.callback.blob_record_size();
                    // The key was overwritten in the meanwhile, so the record
                    // we just wrote into the output file is already stale.
                    // Its liveness must be corrected or the drop would never
                    // be counted in the discardable ratio.
                    if !new_blob_index.is_empty() {
                        let slot = dropped.entry(new_blob_index.file_number).or_default();
                        slot.0 += new_blob_index.blob_handle.size;
                        slot.1.insert(new_blob_index.blob_handle.order);
                    }
                }
                Err(e) => {
                    status = Err(e);
                    break;
                }
            }
            self.metrics.gc_bytes_read_callback += batch.callback.read_bytes();
        }
        // Busy outcomes are expected, not errors; they never escape the loop.

        self.apply_dropped_adjustments(&storage, dropped);
        self.metrics.gc_update_lsm_micros += update_start.elapsed().as_micros() as u64;

        if status.is_ok() {
            status = self.lsm.flush_wal().await;
        }
        status
    }

    /// Step 3: clear the bits of records that lost their race and refresh the
    /// affected files' GC scores and bucket gauges.
    fn apply_dropped_adjustments(
        &self,
        storage: &Arc<BlobStorage>,
        dropped: HashMap<u64, (u64, BTreeSet<u32>)>,
    ) {
        for (file_number, (dropped_bytes, orders)) in dropped {
            if !storage.apply_dropped_records(file_number, &orders, dropped_bytes) {
                error!(file_number, "blob file not found when GC");
            }
        }
    }

    /// Step 2 (shadow target): install the finished side-car index files.
    async fn install_output_shadows(&mut self) -> Result<(), BlobDbError> {
        let shadow_set = self
            .shadow_set
            .as_ref()
            .ok_or_else(|| BlobDbError::InvalidArgument {
                msg: "rewrite_shadow requires a shadow set".to_string(),
            })?;
        let files = std::mem::take(&mut self.finished_shadows);
        shadow_set.install(files).await?;
        Ok(())
    }

    /// Step 5: mark the input files obsolete at the current LSM sequence.
    async fn delete_input_blob_files(&mut self) -> Result<(), BlobDbError> {
        let obsolete_sequence = self.lsm.latest_sequence();
        let mut edit = crate::version_edit::VersionEdit::new(self.blob_gc.cf_id());
        for file in self.blob_gc.inputs() {
            self.metrics.gc_num_input_files += 1;
            self.metrics.gc_input_file_bytes += file.file_size();
            if file.is_obsolete() {
                // A concurrent range deletion or GC already retired it.
                continue;
            }
            info!(
                file_number = file.file_number(),
                smallest_key = ?file.smallest_key(),
                largest_key = ?file.largest_key(),
                obsolete_sequence,
                "GC adds obsolete blob file"
            );
            edit.delete_blob_file(file.file_number(), obsolete_sequence);
        }
        self.blob_file_set.log_and_apply(edit).await
    }

    /// The work unit this job executes, including the output files published
    /// so far.
    pub fn blob_gc(&self) -> &BlobGc {
        &self.blob_gc
    }

    #[cfg(test)]
    pub(crate) fn job_metrics(&self) -> &GcJobMetrics {
        &self.metrics
    }
}


impl Drop for BlobGcJob {
    fn drop(&mut self) {
        let m = &self.metrics;
        self.stats.gc_job_count.inc();
        self.stats.gc_bytes_read_blob.add(m.gc_bytes_read_blob);
        self.stats.gc_bytes_read_check.add(m.gc_bytes_read_check);
        self.stats
            .gc_bytes_read_callback
            .add(m.gc_bytes_read_callback);
        self.stats
            .gc_bytes_written_blob
            .add(m.gc_bytes_written_blob);
        self.stats.gc_bytes_written_lsm.add(m.gc_bytes_written_lsm);
        self.stats
            .gc_num_keys_overwritten_check
            .add(m.gc_num_keys_overwritten_check);
        self.stats
            .gc_num_keys_overwritten_callback
            .add(m.gc_num_keys_overwritten_callback);
        self.stats
            .gc_bytes_overwritten_check
            .add(m.gc_bytes_overwritten_check);
        self.stats
            .gc_bytes_overwritten_callback
            .add(m.gc_bytes_overwritten_callback);
        self.stats
            .gc_num_keys_relocated
            .add(m.gc_num_keys_relocated);
        self.stats.gc_bytes_relocated.add(m.gc_bytes_relocated);
        self.stats.gc_num_keys_fallback.add(m.gc_num_keys_fallback);
        self.stats.gc_bytes_fallback.add(m.gc_bytes_fallback);
        self.stats.gc_num_input_files.add(m.gc_num_input_files);
        self.stats.gc_num_output_files.add(m.gc_num_output_files);
        self.stats.gc_input_file_bytes.add(m.gc_input_file_bytes);
        self.stats.gc_output_file_bytes.add(m.gc_output_file_bytes);
        self.stats.gc_read_lsm_micros.add(m.gc_read_lsm_micros);
        self.stats.gc_update_lsm_micros.add(m.gc_update_lsm_micros);
    }
}
