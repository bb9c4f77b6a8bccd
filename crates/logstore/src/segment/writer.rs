//! Rotating, append-only segment storage.

use crate::bloom::{BloomRegistry, SegmentBloomBuilder};
use crate::codec;
use crate::config::{BloomConfig, SegmentConfig};
use crate::error::Result;
use crate::layout::{max_index, segment_name, FileKind};
use crate::lifecycle::CheckpointStore;
use crate::record::LogRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Buffer size of the segment file writer.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Appends batches to `segment-NNNNNN.bin` files and keeps their bloom
/// indexes and the checkpoint in step.
///
/// For every batch, the bloom index of the open segment is published
/// before the bytes are appended, and the checkpoint advances only after
/// the append has been flushed.
#[derive(Debug)]
pub struct SegmentWriter {
    dir: PathBuf,
    current_file: BufWriter<File>,
    current_index: u64,
    current_size: u64,
    config: SegmentConfig,
    bloom_config: BloomConfig,
    builder: SegmentBloomBuilder,
    registry: Arc<BloomRegistry>,
    checkpoint: Arc<CheckpointStore>,
    sealed: bool,
    /// A failed append could not be cut off; sealed before the next write.
    torn: bool,
}

impl SegmentWriter {
    /// Opens a writer on a new segment above every existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed, or the
    /// segment file cannot be opened.
    pub fn open(
        dir: impl AsRef<Path>,
        config: SegmentConfig,
        bloom_config: BloomConfig,
        registry: Arc<BloomRegistry>,
        checkpoint: Arc<CheckpointStore>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let highest = max_index(&dir, FileKind::Segment)?
            .max(max_index(&dir, FileKind::BloomSidecar)?)
            .unwrap_or(0);
        let index = highest + 1;
        let (file, size) = Self::open_file(&dir, index)?;
        info!(
            "Opened segment file {}",
            FileKind::Segment.file_name(index)
        );

        let writer = Self {
            dir,
            current_file: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            current_index: index,
            current_size: size,
            config,
            bloom_config,
            builder: SegmentBloomBuilder::new(bloom_config),
            registry,
            checkpoint,
            sealed: false,
            torn: false,
        };
        writer.publish_bloom();
        Ok(writer)
    }

    fn open_file(dir: &Path, index: u64) -> Result<(File, u64)> {
        let path = dir.join(FileKind::Segment.file_name(index));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join(FileKind::Segment.file_name(self.current_index))
    }

    fn publish_bloom(&self) {
        self.registry
            .register(segment_name(self.current_index), self.builder.snapshot());
    }

    /// Writes a batch that was appended to WAL file `wal_index`.
    ///
    /// Rotates first if the open segment has reached its size threshold.
    /// On success the checkpoint is set to `wal_index`. An empty batch
    /// writes nothing and leaves the checkpoint alone.
    ///
    /// # Errors
    ///
    /// Returns an error if rotation, the append, or the checkpoint update
    /// fails. The checkpoint is never advanced past a failed append, and the
    /// bytes of a failed append are cut off the segment; if that is not
    /// possible, the segment is sealed and the next batch starts a new one.
    pub fn write_batch(&mut self, wal_index: u64, records: &[LogRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if self.sealed {
            self.start_next_segment()?;
        } else if self.torn
            || (self.current_size > 0 && self.current_size >= self.config.max_file_size)
        {
            self.rotate()?;
        }

        for record in records {
            self.builder.add(record);
        }
        self.publish_bloom();

        let buf = codec::encode_batch(records);
        if let Err(e) = self.write_synced(&buf) {
            self.discard_failed_write();
            return Err(e);
        }
        self.current_size += buf.len() as u64;

        self.checkpoint.update(wal_index)?;

        debug!(
            "Wrote {} records ({} bytes) to segment {} for WAL {}",
            records.len(),
            buf.len(),
            self.current_index,
            wal_index
        );
        Ok(())
    }

    fn write_synced(&mut self, buf: &[u8]) -> Result<()> {
        self.current_file.write_all(buf)?;
        self.current_file.flush()?;
        self.config.sync_mode.apply(self.current_file.get_ref())?;
        Ok(())
    }

    fn discard_failed_write(&mut self) {
        match self.truncate_to_committed() {
            Ok(()) => warn!(
                "Rolled back failed append to segment {} at {} bytes",
                self.current_index, self.current_size
            ),
            Err(e) => {
                error!(
                    "Cannot roll back segment {}, sealing it before the next write: {}",
                    self.current_index, e
                );
                self.torn = true;
            }
        }
    }

    /// Cuts the segment back to the end of the last complete batch and
    /// drops whatever the failed batch left buffered.
    fn truncate_to_committed(&mut self) -> Result<()> {
        let file = OpenOptions::new().append(true).open(self.current_path())?;
        file.set_len(self.current_size)?;
        let stale = mem::replace(
            &mut self.current_file,
            BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        );
        let (_file, _unwritten) = stale.into_parts();
        Ok(())
    }

    /// Seals the open segment and starts the next index.
    pub fn rotate(&mut self) -> Result<()> {
        self.seal()?;
        self.start_next_segment()
    }

    fn start_next_segment(&mut self) -> Result<()> {
        let next = self.current_index + 1;
        let (file, size) = Self::open_file(&self.dir, next)?;
        let stale = mem::replace(
            &mut self.current_file,
            BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        );
        // sealed segments were flushed; an abandoned one keeps only what reached it
        let (_file, _unwritten) = stale.into_parts();
        self.current_index = next;
        self.current_size = size;
        self.builder = SegmentBloomBuilder::new(self.bloom_config);
        self.sealed = false;
        self.torn = false;
        self.publish_bloom();

        info!("Rotated to segment file {}", FileKind::Segment.file_name(next));
        Ok(())
    }

    /// Syncs the open segment and persists its bloom sidecar.
    ///
    /// An empty segment is removed instead. A later `write_batch` opens the
    /// next index. Sealing twice is a no-op. A segment abandoned after a
    /// failed append is not flushed again.
    pub fn seal(&mut self) -> Result<()> {
        if self.sealed {
            return Ok(());
        }
        if !self.torn {
            self.current_file.flush()?;
            self.current_file.get_ref().sync_all()?;
        }

        let name = segment_name(self.current_index);
        if self.builder.bloom().is_empty() && self.current_size == 0 {
            fs::remove_file(self.current_path())?;
            debug!("Removed empty segment {}", name);
        } else {
            let bloom = self.builder.snapshot();
            let sidecar = self
                .dir
                .join(FileKind::BloomSidecar.file_name(self.current_index));
            bloom.save(&sidecar)?;
            self.registry.register(name.clone(), bloom);
            info!("Sealed segment {} ({} bytes)", name, self.current_size);
        }

        self.sealed = true;
        Ok(())
    }

    /// Index of the segment currently written to.
    pub fn current_index(&self) -> u64 {
        self.current_index
    }

    /// Bytes in the open segment.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Segment directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.seal() {
            warn!("Failed to seal segment on drop: {:?}", e);
        }
    }
}
