//! Write-Ahead Log (WAL) for incoming log batches.
//!
//! Every batch is appended to the WAL before it reaches segment storage.
//! WAL files above the checkpoint are replayed at startup. A batch appended
//! to a file the checkpoint already covers (a later batch in the same file)
//! is not replayed if the process crashes before its segment write.
//!
//! # Architecture
//!
//! ```text
//! Batcher → WAL append → Segment write → Checkpoint update → WAL cleanup
//! ```
//!
//! # Features
//!
//! - **Batch Writes**: a batch is encoded into one buffer and written at once
//! - **File Rotation**: files are rotated once they reach a size threshold
//! - **Never Reused Indexes**: a new writer continues above every existing
//!   file and above the checkpoint
//! - **Failed Appends Rolled Back**: a failed write is cut off the file, so
//!   later batches never follow a torn record
//! - **Configurable Durability**: flush to the OS by default, optional
//!   `fdatasync`/`fsync` per batch
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_logstore::wal::WalWriter;
//!
//! let mut wal = WalWriter::open(&wal_dir, WalConfig::default(), checkpoint)?;
//! let wal_index = wal.append_batch(&records)?;
//! segment_writer.write_batch(wal_index, &records)?;
//! ```

use crate::codec;
use crate::config::WalConfig;
use crate::error::Result;
use crate::layout::{max_index, FileKind};
use crate::record::LogRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::mem;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Appends encoded batches to rotating `wal-NNNNNN.log` files.
///
/// Owned by a single consumer; `&mut self` serializes appends and rotation.
#[derive(Debug)]
pub struct WalWriter {
    /// Directory containing WAL files.
    dir: PathBuf,
    /// Writer for the current file.
    current_file: BufWriter<File>,
    /// Index of the current file.
    current_index: u64,
    /// Bytes in the current file.
    current_size: u64,
    /// Rotation and sync settings.
    config: WalConfig,
    /// A failed append could not be cut off; the file takes no more writes.
    torn: bool,
}

impl WalWriter {
    /// Opens a writer on a fresh file whose index is above every existing
    /// WAL file and above `checkpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or listed, or the
    /// file cannot be opened.
    pub fn open(dir: impl AsRef<Path>, config: WalConfig, checkpoint: u64) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let start_index = Self::next_index(dir, checkpoint)?;
        Self::open_at(dir, config, start_index)
    }

    fn open_at(dir: impl AsRef<Path>, config: WalConfig, index: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let (file, size) = Self::open_file(&dir, index)?;

        info!(
            "Opened WAL file {} ({} bytes)",
            FileKind::Wal.file_name(index),
            size
        );

        Ok(Self {
            dir,
            current_file: BufWriter::new(file),
            current_index: index,
            current_size: size,
            config,
            torn: false,
        })
    }

    /// Returns the first index safe to write: `max(existing, checkpoint) + 1`.
    pub fn next_index(dir: &Path, checkpoint: u64) -> Result<u64> {
        let highest = max_index(dir, FileKind::Wal)?.unwrap_or(0);
        Ok(highest.max(checkpoint) + 1)
    }

    fn open_file(dir: &Path, index: u64) -> Result<(File, u64)> {
        let path = dir.join(FileKind::Wal.file_name(index));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    /// Appends a batch as one contiguous write and returns the index of the
    /// file it landed in.
    ///
    /// The current file is rotated first if it has reached the size
    /// threshold. An empty batch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if rotation, the write, or the configured sync fails.
    /// Bytes of a failed batch are removed from the file; if that is not
    /// possible, the next append starts a new file.
    pub fn append_batch(&mut self, records: &[LogRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(self.current_index);
        }

        if self.torn
            || (self.current_size > 0 && self.current_size >= self.config.max_file_size)
        {
            self.rotate()?;
        }

        let buf = codec::encode_batch(records);
        if let Err(e) = self.write_synced(&buf) {
            self.discard_failed_write();
            return Err(e);
        }
        self.current_size += buf.len() as u64;

        debug!(
            "Appended {} records ({} bytes) to WAL file {}",
            records.len(),
            buf.len(),
            self.current_index
        );

        Ok(self.current_index)
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
                "Rolled back failed append to WAL file {} at {} bytes",
                self.current_index, self.current_size
            ),
            Err(e) => {
                error!(
                    "Cannot roll back WAL file {}, abandoning it: {}",
                    self.current_index, e
                );
                self.torn = true;
            }
        }
    }

    /// Cuts the file back to the end of the last complete batch and drops
    /// whatever the failed batch left buffered.
    fn truncate_to_committed(&mut self) -> Result<()> {
        let path = self.dir.join(FileKind::Wal.file_name(self.current_index));
        let file = OpenOptions::new().append(true).open(&path)?;
        file.set_len(self.current_size)?;
        let stale = mem::replace(&mut self.current_file, BufWriter::new(file));
        let (_file, _unwritten) = stale.into_parts();
        Ok(())
    }

    /// Appends a single record.
    pub fn append(&mut self, record: &LogRecord) -> Result<u64> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Closes the current file and starts the next index.
    ///
    /// An abandoned file is not flushed; bytes of the failed batch still
    /// buffered are dropped.
    pub fn rotate(&mut self) -> Result<()> {
        if !self.torn {
            self.current_file.flush()?;
            self.current_file.get_ref().sync_all()?;
        }

        let next = self.current_index + 1;
        let (file, size) = Self::open_file(&self.dir, next)?;
        let stale = mem::replace(&mut self.current_file, BufWriter::new(file));
        let (_file, _unwritten) = stale.into_parts();
        self.current_index = next;
        self.current_size = size;
        self.torn = false;

        info!("Rotated to WAL file {}", FileKind::Wal.file_name(next));
        Ok(())
    }

    /// Index of the file currently appended to.
    pub fn current_index(&self) -> u64 {
        self.current_index
    }

    /// Bytes in the current file.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Flushes and fsyncs the current file.
    pub fn sync(&mut self) -> Result<()> {
        self.current_file.flush()?;
        self.current_file.get_ref().sync_all()?;
        Ok(())
    }

    /// Returns the WAL directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RecordIter;
    use crate::config::SyncMode;
    use crate::layout::list_indexed;
    use crate::record::Level;
    use tempfile::TempDir;

    fn small_config() -> WalConfig {
        WalConfig {
            max_file_size: 64,
            sync_mode: SyncMode::None,
        }
    }

    fn read_file(dir: &Path, index: u64) -> Vec<LogRecord> {
        let bytes = fs::read(dir.join(FileKind::Wal.file_name(index))).unwrap();
        RecordIter::new(&bytes).collect()
    }

    #[test]
    fn test_fresh_install_starts_at_one() {
        let temp_dir = TempDir::new().unwrap();
        let wal = WalWriter::open(temp_dir.path(), WalConfig::default(), 0).unwrap();
        assert_eq!(wal.current_index(), 1);
        assert!(temp_dir.path().join("wal-000001.log").exists());
    }

    #[test]
    fn test_append_batch_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(temp_dir.path(), WalConfig::default(), 0).unwrap();

        let records = vec![
            LogRecord::new(1, Level::Info, "first"),
            LogRecord::new(2, Level::Error, "second"),
        ];
        assert_eq!(wal.append_batch(&records).unwrap(), 1);
        assert_eq!(wal.append(&LogRecord::new(3, Level::Debug, "third")).unwrap(), 1);

        let stored = read_file(temp_dir.path(), 1);
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[..2], records[..]);
    }

    #[test]
    fn test_empty_batch_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(temp_dir.path(), WalConfig::default(), 0).unwrap();
        assert_eq!(wal.append_batch(&[]).unwrap(), 1);
        assert_eq!(wal.current_size(), 0);
    }

    #[test]
    fn test_rotation_at_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(temp_dir.path(), small_config(), 0).unwrap();

        // 11-byte header + 60-byte message exceeds the 64-byte threshold
        let big = LogRecord::new(1, Level::Info, "x".repeat(60));
        assert_eq!(wal.append_batch(std::slice::from_ref(&big)).unwrap(), 1);
        assert_eq!(wal.append_batch(&[LogRecord::new(2, Level::Info, "y")]).unwrap(), 2);
        assert_eq!(wal.current_index(), 2);

        assert_eq!(read_file(temp_dir.path(), 1), vec![big]);
        assert_eq!(read_file(temp_dir.path(), 2).len(), 1);
    }

    #[test]
    fn test_restart_never_reuses_index() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut wal = WalWriter::open(temp_dir.path(), small_config(), 0).unwrap();
            wal.append(&LogRecord::new(1, Level::Info, "x".repeat(60))).unwrap();
            wal.append(&LogRecord::new(2, Level::Info, "y")).unwrap();
            assert_eq!(wal.current_index(), 2);
        }

        let wal = WalWriter::open(temp_dir.path(), small_config(), 0).unwrap();
        assert_eq!(wal.current_index(), 3);

        // a checkpoint above every file wins
        let wal = WalWriter::open(temp_dir.path(), small_config(), 9).unwrap();
        assert_eq!(wal.current_index(), 10);

        let indexes: Vec<u64> = list_indexed(temp_dir.path(), FileKind::Wal)
            .unwrap()
            .iter()
            .map(|f| f.index)
            .collect();
        assert_eq!(indexes, vec![1, 2, 3, 10]);
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(temp_dir.path(), WalConfig::default(), 0).unwrap();
        let first = vec![LogRecord::new(1, Level::Info, "before failure")];
        wal.append_batch(&first).unwrap();
        let committed = wal.current_size();
        let path = temp_dir.path().join(FileKind::Wal.file_name(1));

        // half a record reached the disk, then the handle stopped accepting writes
        let torn = codec::encode(&LogRecord::new(2, Level::Error, "torn record"));
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&torn[..torn.len() / 2])
            .unwrap();
        wal.current_file = BufWriter::new(File::open(&path).unwrap());

        let failed = vec![LogRecord::new(3, Level::Warn, "z".repeat(100)); 200];
        assert!(wal.append_batch(&failed).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);

        let third = vec![LogRecord::new(4, Level::Info, "after failure")];
        assert_eq!(wal.append_batch(&third).unwrap(), 1);
        assert_eq!(read_file(temp_dir.path(), 1), [first, third].concat());
    }

    #[test]
    fn test_unrepairable_file_is_abandoned() {
        let temp_dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(temp_dir.path(), WalConfig::default(), 0).unwrap();
        wal.append(&LogRecord::new(1, Level::Info, "before failure"))
            .unwrap();
        let path = temp_dir.path().join(FileKind::Wal.file_name(1));

        wal.current_file = BufWriter::new(File::open(&path).unwrap());
        fs::remove_file(&path).unwrap();
        let failed = vec![LogRecord::new(2, Level::Warn, "z".repeat(100)); 200];
        assert!(wal.append_batch(&failed).is_err());

        let next = vec![LogRecord::new(3, Level::Info, "fresh file")];
        assert_eq!(wal.append_batch(&next).unwrap(), 2);
        assert_eq!(read_file(temp_dir.path(), 2), next);
    }

    #[test]
    fn test_fsync_mode() {
        let temp_dir = TempDir::new().unwrap();
        let config = WalConfig {
            max_file_size: 1024,
            sync_mode: SyncMode::Fsync,
        };
        let mut wal = WalWriter::open(temp_dir.path(), config, 0).unwrap();
        wal.append(&LogRecord::new(7, Level::Warn, "durable")).unwrap();
        wal.sync().unwrap();
        drop(wal);

        assert_eq!(read_file(temp_dir.path(), 1).len(), 1);
    }
}
