//! Deletes WAL files already reflected in segment storage.

use crate::error::Result;
use crate::layout::{list_indexed, FileKind};
use crate::lifecycle::CheckpointStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Indexes of deleted files.
    pub deleted: Vec<u64>,
    /// Indexes of files that could not be deleted.
    pub failed: Vec<u64>,
}

/// Removes every WAL file whose index is at or below the checkpoint.
#[derive(Debug, Clone)]
pub struct WalCleaner {
    wal_dir: PathBuf,
    checkpoint: Arc<CheckpointStore>,
}

impl WalCleaner {
    /// Creates a cleaner for `wal_dir`.
    pub fn new(wal_dir: impl AsRef<Path>, checkpoint: Arc<CheckpointStore>) -> Self {
        Self {
            wal_dir: wal_dir.as_ref().to_path_buf(),
            checkpoint,
        }
    }

    /// Deletes WAL files with index `<= checkpoint`, except `active`.
    ///
    /// Best effort: a failed delete is logged and recorded in the report,
    /// and the remaining files are still processed.
    ///
    /// # Errors
    ///
    /// Returns an error only if the WAL directory cannot be listed.
    pub fn clean_below_checkpoint(&self, active: Option<u64>) -> Result<CleanReport> {
        let checkpoint = self.checkpoint.last_flushed();
        let mut report = CleanReport::default();

        for file in list_indexed(&self.wal_dir, FileKind::Wal)? {
            if file.index > checkpoint || Some(file.index) == active {
                continue;
            }
            match fs::remove_file(&file.path) {
                Ok(()) => {
                    debug!("Removed WAL file {}", file.path.display());
                    report.deleted.push(file.index);
                }
                Err(e) => {
                    warn!("Failed to remove WAL file {}: {}", file.path.display(), e);
                    report.failed.push(file.index);
                }
            }
        }

        Ok(report)
    }
}
