//! Configuration for the log store.
//!
//! Every section has working defaults, so an empty TOML document (or
//! `StoreConfig::default()`) yields a usable store rooted at `./data`.
//!
//! ```toml
//! data_dir = "/var/lib/logstore"
//!
//! [wal]
//! max_file_size = 1048576
//! sync_mode = "fdatasync"
//!
//! [batch]
//! max_records = 500
//! max_wait_ms = 250
//! ```

use crate::error::{Result, StoreError};
use crate::layout::StoreLayout;
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default rotation threshold for WAL files (1 MiB).
pub const DEFAULT_WAL_FILE_SIZE: u64 = 1024 * 1024;

/// Default rotation threshold for segment files (10 MiB).
pub const DEFAULT_SEGMENT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default bloom filter size in bits.
pub const DEFAULT_BLOOM_BITS: usize = 1 << 20;

/// Default number of bloom hash probes.
pub const DEFAULT_BLOOM_HASHES: u32 = 3;

/// Default number of records that triggers a batch flush.
pub const DEFAULT_BATCH_RECORDS: usize = 1000;

/// Default time between batch flushes.
pub const DEFAULT_BATCH_WAIT: Duration = Duration::from_secs(1);

/// Sync mode applied after each appended batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Flush to OS buffers only (default; survives process crash, not power loss).
    #[default]
    None,
    /// Use fdatasync (skip metadata update).
    Fdatasync,
    /// Fsync after each batch write.
    Fsync,
}

impl SyncMode {
    /// Syncs `file` according to this mode. Buffers must already be flushed.
    pub fn apply(self, file: &File) -> io::Result<()> {
        match self {
            Self::None => Ok(()),
            Self::Fdatasync => file.sync_data(),
            Self::Fsync => file.sync_all(),
        }
    }
}

/// WAL writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Size in bytes at which the current WAL file is rotated.
    pub max_file_size: u64,
    /// Durability applied after each batch.
    pub sync_mode: SyncMode,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_WAL_FILE_SIZE,
            sync_mode: SyncMode::None,
        }
    }
}

/// Segment writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Size in bytes at which the current segment is sealed and rotated.
    pub max_file_size: u64,
    /// Durability applied after each batch.
    pub sync_mode: SyncMode,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_SEGMENT_FILE_SIZE,
            sync_mode: SyncMode::None,
        }
    }
}

/// Bloom filter dimensions used for new segment indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Bit array size (m).
    pub num_bits: usize,
    /// Number of hash probes (k).
    pub num_hashes: u32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            num_bits: DEFAULT_BLOOM_BITS,
            num_hashes: DEFAULT_BLOOM_HASHES,
        }
    }
}

/// Ingestion batching thresholds; whichever is hit first emits a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of buffered records that triggers a flush.
    pub max_records: usize,
    /// Milliseconds since the previous flush that trigger a flush.
    pub max_wait_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_BATCH_RECORDS,
            max_wait_ms: DEFAULT_BATCH_WAIT.as_millis() as u64,
        }
    }
}

impl BatchConfig {
    /// Returns the time threshold as a `Duration`.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory holding `wal/` and `segments/`.
    pub data_dir: PathBuf,
    /// WAL writer settings.
    pub wal: WalConfig,
    /// Segment writer settings.
    pub segment: SegmentConfig,
    /// Bloom index settings.
    pub bloom: BloomConfig,
    /// Batching thresholds.
    pub batch: BatchConfig,
    /// Rescan segments with a missing or unreadable bloom sidecar at startup.
    pub rebuild_missing_indexes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            wal: WalConfig::default(),
            segment: SegmentConfig::default(),
            bloom: BloomConfig::default(),
            batch: BatchConfig::default(),
            rebuild_missing_indexes: true,
        }
    }
}

impl StoreConfig {
    /// Creates a default configuration rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bloom.num_bits == 0 {
            return Err(StoreError::Config("bloom.num_bits must be > 0".into()));
        }
        if u32::try_from(self.bloom.num_bits).is_err() {
            return Err(StoreError::Config(format!(
                "bloom.num_bits must be <= {}",
                u32::MAX
            )));
        }
        if self.bloom.num_hashes == 0 {
            return Err(StoreError::Config("bloom.num_hashes must be > 0".into()));
        }
        if self.batch.max_records == 0 {
            return Err(StoreError::Config("batch.max_records must be > 0".into()));
        }
        if self.batch.max_wait_ms == 0 {
            return Err(StoreError::Config("batch.max_wait_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Returns the on-disk layout derived from `data_dir`.
    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.data_dir)
    }
}
