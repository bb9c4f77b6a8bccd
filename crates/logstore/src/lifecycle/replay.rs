//! Startup recovery of WAL files not yet reflected in segments.

use crate::codec::{RecordIter, StopReason};
use crate::error::Result;
use crate::layout::{list_indexed, FileKind};
use crate::lifecycle::{CheckpointStore, WalCleaner};
use crate::segment::SegmentWriter;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// WAL files that yielded at least one record.
    pub files_replayed: usize,
    /// Records written to segments.
    pub records_replayed: usize,
    /// Checkpoint after replay.
    pub checkpoint: u64,
}

/// Replays WAL files above the checkpoint into segment storage.
///
/// Runs once at startup, before ingestion begins.
#[derive(Debug)]
pub struct WalReplayer {
    wal_dir: PathBuf,
    checkpoint: Arc<CheckpointStore>,
    cleaner: WalCleaner,
}

impl WalReplayer {
    /// Creates a replayer for `wal_dir`.
    pub fn new(
        wal_dir: impl AsRef<Path>,
        checkpoint: Arc<CheckpointStore>,
        cleaner: WalCleaner,
    ) -> Self {
        Self {
            wal_dir: wal_dir.as_ref().to_path_buf(),
            checkpoint,
            cleaner,
        }
    }

    /// Replays every WAL file with index above the checkpoint, ascending.
    ///
    /// Each file's complete records go to the segment writer tagged with the
    /// file's index, which advances the checkpoint. A torn or corrupt tail
    /// ends that file's records without failing. The cleaner runs last.
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL directory cannot be listed, a file cannot
    /// be read, or a segment write fails. Files already replayed stay
    /// covered by the checkpoint, so a rerun resumes after them.
    pub fn replay(&self, segments: &mut SegmentWriter) -> Result<ReplayReport> {
        let last_flushed = self.checkpoint.last_flushed();
        let pending: Vec<_> = list_indexed(&self.wal_dir, FileKind::Wal)?
            .into_iter()
            .filter(|f| f.index > last_flushed)
            .collect();

        info!(
            "Starting WAL replay: checkpoint={}, {} pending files",
            last_flushed,
            pending.len()
        );

        let mut report = ReplayReport::default();
        for file in pending {
            let bytes = fs::read(&file.path)?;
            let mut iter = RecordIter::new(&bytes);
            let batch: Vec<_> = iter.by_ref().collect();

            match iter.stop_reason() {
                Some(StopReason::Truncated) => warn!(
                    "WAL file {} has {} trailing bytes after the last complete record",
                    file.path.display(),
                    iter.remaining()
                ),
                Some(StopReason::Corrupt) => warn!(
                    "WAL file {} has a corrupt record at offset {}",
                    file.path.display(),
                    iter.offset()
                ),
                _ => {}
            }

            if batch.is_empty() {
                continue;
            }
            segments.write_batch(file.index, &batch)?;
            report.files_replayed += 1;
            report.records_replayed += batch.len();
            info!(
                "Replayed {} records from {}",
                batch.len(),
                file.path.display()
            );
        }

        let cleaned = self.cleaner.clean_below_checkpoint(None)?;
        report.checkpoint = self.checkpoint.last_flushed();
        info!(
            "WAL replay complete: {} files, {} records, checkpoint={}, {} files removed",
            report.files_replayed,
            report.records_replayed,
            report.checkpoint,
            cleaned.deleted.len()
        );

        Ok(report)
    }
}
