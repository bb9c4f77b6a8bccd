//! Synchronous flush path for one batch.

use crate::error::Result;
use crate::lifecycle::WalCleaner;
use crate::record::LogRecord;
use crate::segment::SegmentWriter;
use crate::wal::WalWriter;
use tracing::debug;

/// Owns the WAL writer, segment writer, and cleaner, and runs a batch
/// through them in order: WAL append, segment write, WAL cleanup.
///
/// Exactly one owner exists at a time, so appends never interleave.
#[derive(Debug)]
pub struct FlushPipeline {
    wal: WalWriter,
    segments: SegmentWriter,
    cleaner: WalCleaner,
}

impl FlushPipeline {
    /// Assembles a pipeline.
    pub fn new(wal: WalWriter, segments: SegmentWriter, cleaner: WalCleaner) -> Self {
        Self {
            wal,
            segments,
            cleaner,
        }
    }

    /// Flushes one batch and returns the WAL index it was written to.
    ///
    /// Stops at the first failing stage. The segment write is skipped if the
    /// WAL append fails, and cleanup is skipped if the segment write fails.
    pub fn flush(&mut self, batch: &[LogRecord]) -> Result<u64> {
        let wal_index = self.wal.append_batch(batch)?;
        self.segments.write_batch(wal_index, batch)?;

        let report = self
            .cleaner
            .clean_below_checkpoint(Some(self.wal.current_index()))?;

        debug!(
            "Flushed batch of {} records (wal={}, segment={}, {} WAL files removed)",
            batch.len(),
            wal_index,
            self.segments.current_index(),
            report.deleted.len()
        );
        Ok(wal_index)
    }

    /// Seals the open segment and syncs the WAL.
    pub fn seal(&mut self) -> Result<()> {
        self.segments.seal()?;
        self.wal.sync()
    }

    /// Index of the WAL file currently appended to.
    pub fn wal_index(&self) -> u64 {
        self.wal.current_index()
    }

    /// Index of the segment currently written to.
    pub fn segment_index(&self) -> u64 {
        self.segments.current_index()
    }
}
