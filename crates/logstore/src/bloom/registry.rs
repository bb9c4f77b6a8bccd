//! In-memory map from segment name to its bloom index.

use crate::bloom::{SegmentBloom, SegmentBloomBuilder};
use crate::codec::RecordIter;
use crate::config::BloomConfig;
use crate::error::Result;
use crate::layout::{list_indexed, segment_name, FileKind};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Shared registry of segment bloom indexes, keyed by `segment-NNNNNN`.
///
/// Written by the segment writer and by startup loading, read by queries.
/// A segment without an entry is always fully scanned.
#[derive(Debug, Default)]
pub struct BloomRegistry {
    inner: RwLock<HashMap<String, Arc<SegmentBloom>>>,
}

impl BloomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every readable sidecar in `segment_dir`.
    ///
    /// Unreadable sidecars are logged and left out; their segments fall
    /// back to a full scan. Returns the number of indexes loaded.
    pub fn load(&self, segment_dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for sidecar in list_indexed(segment_dir, FileKind::BloomSidecar)? {
            match SegmentBloom::load(&sidecar.path) {
                Ok(bloom) => {
                    self.register(segment_name(sidecar.index), bloom);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable bloom index {}: {}",
                        sidecar.path.display(),
                        e
                    );
                }
            }
        }
        info!("Loaded {} bloom indexes from {}", loaded, segment_dir.display());
        Ok(loaded)
    }

    /// Rebuilds and persists the index of every segment that has none.
    ///
    /// A segment that cannot be read or whose sidecar cannot be written is
    /// logged and skipped. Returns the number of indexes rebuilt.
    pub fn rebuild_missing(&self, segment_dir: &Path, config: BloomConfig) -> Result<usize> {
        let mut rebuilt = 0;
        for segment in list_indexed(segment_dir, FileKind::Segment)? {
            let name = segment_name(segment.index);
            if self.get(&name).is_some() {
                continue;
            }

            let bytes = match fs::read(&segment.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Cannot read segment {}: {}", segment.path.display(), e);
                    continue;
                }
            };
            let records: Vec<_> = RecordIter::new(&bytes).collect();
            let bloom = SegmentBloomBuilder::from_records(config, &records).build();

            let sidecar = segment_dir.join(FileKind::BloomSidecar.file_name(segment.index));
            if let Err(e) = bloom.save(&sidecar) {
                warn!("Cannot persist bloom index {}: {}", sidecar.display(), e);
            }
            debug!("Rebuilt bloom index for {} ({} records)", name, records.len());
            self.register(name, bloom);
            rebuilt += 1;
        }
        if rebuilt > 0 {
            info!("Rebuilt {} missing bloom indexes", rebuilt);
        }
        Ok(rebuilt)
    }

    /// Returns the index registered for `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<SegmentBloom>> {
        let map = self.inner.read().unwrap_or_else(|err| err.into_inner());
        map.get(name).cloned()
    }

    /// Registers or replaces the index for `name`.
    pub fn register(&self, name: impl Into<String>, bloom: SegmentBloom) {
        let mut map = self.inner.write().unwrap_or_else(|err| err.into_inner());
        map.insert(name.into(), Arc::new(bloom));
    }

    /// Number of registered indexes.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|err| err.into_inner()).len()
    }

    /// Returns true if no index is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
