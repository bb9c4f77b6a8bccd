//! On-disk layout: directories, file naming, and indexed listings.
//!
//! ```text
//! <data_dir>/
//!   wal/
//!     wal-000001.log
//!     checkpoint.meta
//!   segments/
//!     segment-000001.bin
//!     segment-000001.bf      (bloom sidecar, sealed segments)
//! ```

use crate::error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Kinds of indexed files the store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `wal-NNNNNN.log`
    Wal,
    /// `segment-NNNNNN.bin`
    Segment,
    /// `segment-NNNNNN.bf`
    BloomSidecar,
}

impl FileKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Wal => "wal-",
            Self::Segment | Self::BloomSidecar => "segment-",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Wal => ".log",
            Self::Segment => ".bin",
            Self::BloomSidecar => ".bf",
        }
    }

    /// Builds the file name for `index`.
    ///
    /// # Examples
    /// ```rust,ignore
    /// use alopex_logstore::layout::FileKind;
    ///
    /// assert_eq!(FileKind::Wal.file_name(12), "wal-000012.log");
    /// ```
    pub fn file_name(self, index: u64) -> String {
        format!("{}{:06}{}", self.prefix(), index, self.extension())
    }

    /// Parses the index out of a file name of this kind.
    pub fn parse_index(self, name: &str) -> Option<u64> {
        let digits = name
            .strip_prefix(self.prefix())?
            .strip_suffix(self.extension())?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// Returns the segment base name (`segment-NNNNNN`) used to key bloom indexes.
pub fn segment_name(index: u64) -> String {
    format!("segment-{:06}", index)
}

/// Indexed file discovered by a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedFile {
    /// Index embedded in the file name.
    pub index: u64,
    /// Full path.
    pub path: PathBuf,
}

/// Lists files of `kind` in `dir`, ascending by index.
///
/// Directory iteration order is not trusted. A missing directory yields an
/// empty list.
pub fn list_indexed(dir: &Path, kind: FileKind) -> Result<Vec<IndexedFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(index) = kind.parse_index(name) {
            files.push(IndexedFile {
                index,
                path: entry.path(),
            });
        }
    }

    files.sort_by_key(|f| f.index);
    Ok(files)
}

/// Returns the highest index of `kind` in `dir`, if any.
pub fn max_index(dir: &Path, kind: FileKind) -> Result<Option<u64>> {
    Ok(list_indexed(dir, kind)?.last().map(|f| f.index))
}

/// Paths derived from the store's data directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    data_dir: PathBuf,
}

impl StoreLayout {
    /// Creates a layout rooted at `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Root data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory of WAL files.
    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    /// Directory of segments and bloom sidecars.
    pub fn segment_dir(&self) -> PathBuf {
        self.data_dir.join("segments")
    }

    /// Checkpoint file path.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.wal_dir().join("checkpoint.meta")
    }

    /// Creates the WAL and segment directories.
    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.wal_dir())?;
        fs::create_dir_all(self.segment_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names() {
        assert_eq!(FileKind::Wal.file_name(1), "wal-000001.log");
        assert_eq!(FileKind::Segment.file_name(42), "segment-000042.bin");
        assert_eq!(FileKind::BloomSidecar.file_name(7), "segment-000007.bf");
        assert_eq!(segment_name(3), "segment-000003");
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(FileKind::Wal.parse_index("wal-000123.log"), Some(123));
        assert_eq!(FileKind::Wal.parse_index("wal-1234567.log"), Some(1_234_567));
        assert_eq!(FileKind::Wal.parse_index("wal-.log"), None);
        assert_eq!(FileKind::Wal.parse_index("wal-00x1.log"), None);
        assert_eq!(FileKind::Wal.parse_index("checkpoint.meta"), None);
        assert_eq!(FileKind::Segment.parse_index("segment-000002.bf"), None);
        assert_eq!(FileKind::BloomSidecar.parse_index("segment-000002.bf"), Some(2));
    }

    #[test]
    fn test_list_sorted_by_index() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["wal-000010.log", "wal-000002.log", "wal-000001.log", "notes.txt"] {
            fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let files = list_indexed(temp_dir.path(), FileKind::Wal).unwrap();
        let indexes: Vec<u64> = files.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![1, 2, 10]);
        assert_eq!(max_index(temp_dir.path(), FileKind::Wal).unwrap(), Some(10));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        assert!(list_indexed(&missing, FileKind::Segment).unwrap().is_empty());
        assert_eq!(max_index(&missing, FileKind::Segment).unwrap(), None);
    }
}
