//! Durable pointer to the highest WAL index reflected in segments.
//!
//! Stored as a single line in `wal/checkpoint.meta`:
//!
//! ```text
//! lastFlushedWalIndex=42
//! ```

use crate::error::{Result, StoreError};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

const KEY: &str = "lastFlushedWalIndex";

/// Checkpoint value shared by the segment writer, cleaner, and replayer.
///
/// Reads are lock-free. Updates overwrite the file unconditionally
/// (last writer wins); callers pass increasing indexes.
///
/// # Examples
/// ```rust,ignore
/// use alopex_logstore::lifecycle::CheckpointStore;
///
/// let checkpoint = CheckpointStore::load(layout.checkpoint_path())?;
/// checkpoint.update(7)?;
/// assert_eq!(checkpoint.last_flushed(), 7);
/// ```
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    value: AtomicU64,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    /// Loads the checkpoint at `path`; a missing file means a fresh install (0).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidCheckpoint`] if the file exists but does
    /// not hold `lastFlushedWalIndex=<int>`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let value = match fs::read_to_string(&path) {
            Ok(text) => parse(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No checkpoint at {}, starting fresh", path.display());
                0
            }
            Err(e) => return Err(e.into()),
        };
        info!("Loaded checkpoint {}={}", KEY, value);

        Ok(Self {
            path,
            value: AtomicU64::new(value),
            write_lock: Mutex::new(()),
        })
    }

    /// Highest WAL index known to be fully written to segments.
    pub fn last_flushed(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Persists `index` and then publishes it.
    ///
    /// The file is replaced atomically (temp file, fsync, rename), so a
    /// crash leaves either the old or the new value on disk.
    pub fn update(&self, index: u64) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|err| err.into_inner());

        let tmp_path = self.path.with_extension("meta.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            write!(file, "{}={}", KEY, index)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.value.store(index, Ordering::Release);
        debug!("Updated checkpoint {}={}", KEY, index);
        Ok(())
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse(text: &str) -> Result<u64> {
    let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(0);
    };
    let value = line
        .strip_prefix(KEY)
        .and_then(|rest| rest.trim_start().strip_prefix('='))
        .ok_or_else(|| StoreError::InvalidCheckpoint(format!("unexpected line {:?}", line)))?;
    value
        .trim()
        .parse()
        .map_err(|e| StoreError::InvalidCheckpoint(format!("{:?}: {}", value, e)))
}
