//! Per-segment bloom index and its sidecar file.
//!
//! ## Sidecar Layout
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Bloom filter (see BloomFilter::write_to) │
//! │  min_ts: i64 BE                           │
//! │  max_ts: i64 BE                           │
//! │  crc32: u32 BE (over everything above)    │
//! └──────────────────────────────────────────┘
//! ```

use crate::bloom::BloomFilter;
use crate::config::BloomConfig;
use crate::error::{Result, StoreError};
use crate::record::{LogRecord, Timestamp};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Bloom filter plus observed timestamp range of one segment.
///
/// Advisory only: a `false` from any check proves the segment holds no
/// match, a `true` proves nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBloom {
    /// Filter over level names and lowercase message words.
    pub filter: BloomFilter,
    /// Smallest timestamp observed (`i64::MAX` while empty).
    pub min_ts: Timestamp,
    /// Largest timestamp observed (`i64::MIN` while empty).
    pub max_ts: Timestamp,
}

impl SegmentBloom {
    /// Creates an empty index.
    pub fn new(config: BloomConfig) -> Self {
        Self {
            filter: BloomFilter::new(config.num_bits, config.num_hashes),
            min_ts: Timestamp::MAX,
            max_ts: Timestamp::MIN,
        }
    }

    /// Returns true if no record has been observed.
    pub fn is_empty(&self) -> bool {
        self.min_ts > self.max_ts
    }

    /// Widens the timestamp range to include `ts`.
    pub fn update_ts(&mut self, ts: Timestamp) {
        self.min_ts = self.min_ts.min(ts);
        self.max_ts = self.max_ts.max(ts);
    }

    /// Returns false if no observed timestamp can fall in `[start, end]`.
    pub fn may_overlap(&self, start: Option<Timestamp>, end: Option<Timestamp>) -> bool {
        if let Some(start) = start {
            if self.max_ts < start {
                return false;
            }
        }
        if let Some(end) = end {
            if self.min_ts > end {
                return false;
            }
        }
        true
    }

    /// Serializes the index with a trailing CRC32.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.filter.num_bits() / 8 + 32);
        self.filter.write_to(&mut buf)?;
        buf.extend_from_slice(&self.min_ts.to_be_bytes());
        buf.extend_from_slice(&self.max_ts.to_be_bytes());
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_be_bytes());
        Ok(buf)
    }

    /// Parses bytes produced by [`SegmentBloom::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 {
            return Err(StoreError::CorruptBloomIndex("sidecar too short".into()));
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 4);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = crc32fast::hash(body);
        if expected != actual {
            return Err(StoreError::ChecksumMismatch { expected, actual });
        }

        let mut reader = body;
        let filter = BloomFilter::read_from(&mut reader)?;
        let mut buf8 = [0u8; 8];
        reader.read_exact(&mut buf8)?;
        let min_ts = i64::from_be_bytes(buf8);
        reader.read_exact(&mut buf8)?;
        let max_ts = i64::from_be_bytes(buf8);
        if !reader.is_empty() {
            return Err(StoreError::CorruptBloomIndex(format!(
                "{} unexpected trailing bytes",
                reader.len()
            )));
        }

        Ok(Self {
            filter,
            min_ts,
            max_ts,
        })
    }

    /// Writes the sidecar atomically (temp file, fsync, rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let tmp_path = path.with_extension("bf.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Loads a sidecar written by [`SegmentBloom::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

/// Accumulates the bloom index of a segment while it is written.
#[derive(Debug, Clone)]
pub struct SegmentBloomBuilder {
    bloom: SegmentBloom,
}

impl SegmentBloomBuilder {
    /// Starts an empty index.
    pub fn new(config: BloomConfig) -> Self {
        Self {
            bloom: SegmentBloom::new(config),
        }
    }

    /// Builds an index from existing records.
    pub fn from_records<'a>(
        config: BloomConfig,
        records: impl IntoIterator<Item = &'a LogRecord>,
    ) -> Self {
        let mut builder = Self::new(config);
        for record in records {
            builder.add(record);
        }
        builder
    }

    /// Indexes the record's level, its message words, and its timestamp.
    pub fn add(&mut self, record: &LogRecord) {
        self.bloom.filter.add(record.level().as_str());
        for token in record.tokens() {
            self.bloom.filter.add(&token);
        }
        self.bloom.update_ts(record.timestamp());
    }

    /// The index built so far.
    pub fn bloom(&self) -> &SegmentBloom {
        &self.bloom
    }

    /// Copy of the index built so far, for the still-open segment.
    pub fn snapshot(&self) -> SegmentBloom {
        self.bloom.clone()
    }

    /// Finishes the index of a sealed segment.
    pub fn build(self) -> SegmentBloom {
        self.bloom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use tempfile::TempDir;

    fn small_config() -> BloomConfig {
        BloomConfig {
            num_bits: 4096,
            num_hashes: 3,
        }
    }

    #[test]
    fn test_builder_indexes_levels_and_words() {
        let mut builder = SegmentBloomBuilder::new(small_config());
        builder.add(&LogRecord::new(200, Level::Error, "Disk FULL on node-7"));
        builder.add(&LogRecord::new(100, Level::Info, "started"));

        let bloom = builder.build();
        assert!(bloom.filter.might_contain("ERROR"));
        assert!(bloom.filter.might_contain("INFO"));
        assert!(bloom.filter.might_contain("disk"));
        assert!(bloom.filter.might_contain("full"));
        assert!(bloom.filter.might_contain("node-7"));
        assert_eq!(bloom.min_ts, 100);
        assert_eq!(bloom.max_ts, 200);
    }

    #[test]
    fn test_time_overlap() {
        let mut bloom = SegmentBloom::new(small_config());
        assert!(bloom.is_empty());
        assert!(!bloom.may_overlap(Some(0), None));

        bloom.update_ts(100);
        bloom.update_ts(300);
        assert!(bloom.may_overlap(None, None));
        assert!(bloom.may_overlap(Some(300), None));
        assert!(!bloom.may_overlap(Some(301), None));
        assert!(bloom.may_overlap(None, Some(100)));
        assert!(!bloom.may_overlap(None, Some(99)));
        assert!(bloom.may_overlap(Some(150), Some(160)));
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("segment-000001.bf");

        let bloom = SegmentBloomBuilder::from_records(
            small_config(),
            &[
                LogRecord::new(5, Level::Warn, "slow query"),
                LogRecord::new(9, Level::Debug, "cache miss"),
            ],
        )
        .build();
        bloom.save(&path).unwrap();
        assert!(!temp_dir.path().join("segment-000001.bf.tmp").exists());

        let loaded = SegmentBloom::load(&path).unwrap();
        assert_eq!(loaded, bloom);
    }

    #[test]
    fn test_sidecar_crc_detects_corruption() {
        let bloom = SegmentBloom::new(small_config());
        let mut bytes = bloom.to_bytes().unwrap();
        bytes[6] ^= 0xFF;

        let err = SegmentBloom::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_sidecar_truncated() {
        let err = SegmentBloom::from_bytes(&[1, 2]).unwrap_err();
        assert!(matches!(err, StoreError::CorruptBloomIndex(_)));
    }
}
