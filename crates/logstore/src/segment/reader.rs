//! Query engine over segment files.

use crate::bloom::{BloomRegistry, SegmentBloom};
use crate::codec::RecordIter;
use crate::error::Result;
use crate::layout::{list_indexed, segment_name, FileKind};
use crate::record::{LogRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result limit applied when none (or a non-positive one) is given.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Query parameters. Every filter is optional.
///
/// Deserializes from `limit`, `start`, `end`, `level`, and `keyword`
/// (also accepted as `message`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogQuery {
    /// Maximum number of results; `None` or `<= 0` means 100.
    pub limit: Option<i64>,
    /// Inclusive lower timestamp bound.
    pub start: Option<Timestamp>,
    /// Inclusive upper timestamp bound.
    pub end: Option<Timestamp>,
    /// Level name, matched case-insensitively.
    pub level: Option<String>,
    /// Substring matched case-insensitively against the message.
    #[serde(alias = "message")]
    pub keyword: Option<String>,
}

impl LogQuery {
    /// A query for the `limit` most recent records.
    pub fn recent(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the timestamp range; either bound may be open.
    pub fn with_range(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Sets the level filter.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Sets the keyword filter.
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// The limit actually applied.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => usize::try_from(limit).unwrap_or(usize::MAX),
            _ => DEFAULT_QUERY_LIMIT,
        }
    }
}

/// Records returned by a query, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Matching records, non-increasing by timestamp.
    #[serde(rename = "results")]
    pub records: Vec<LogRecord>,
    /// Number of records.
    pub count: usize,
    /// Elapsed wall time in milliseconds.
    pub took_ms: u64,
}

/// Normalized filters, prepared once per query.
#[derive(Debug)]
struct Filter {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    level: Option<String>,
    keyword: Option<String>,
}

impl Filter {
    fn new(query: &LogQuery) -> Self {
        Self {
            start: query.start,
            end: query.end,
            level: non_empty(&query.level).map(str::to_owned),
            keyword: non_empty(&query.keyword).map(str::to_lowercase),
        }
    }

    /// Returns false only if the segment provably holds no match.
    fn may_match(&self, bloom: &SegmentBloom) -> bool {
        if !bloom.may_overlap(self.start, self.end) {
            return false;
        }
        if let Some(level) = &self.level {
            // levels are indexed by their upper-case name
            if !bloom.filter.might_contain(level.to_ascii_uppercase().as_str()) {
                return false;
            }
        }
        bloom.filter.might_contain(self.keyword.as_deref())
    }

    fn matches(&self, record: &LogRecord) -> bool {
        let ts = record.timestamp();
        if self.start.is_some_and(|start| ts < start) || self.end.is_some_and(|end| ts > end) {
            return false;
        }
        if let Some(level) = &self.level {
            if !record.level().as_str().eq_ignore_ascii_case(level) {
                return false;
            }
        }
        match &self.keyword {
            Some(keyword) => record.message().to_lowercase().contains(keyword.as_str()),
            None => true,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Scans segments newest to oldest, skipping those whose bloom index rules
/// out a match.
///
/// Safe to share across threads; queries only read files and the registry.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    segment_dir: PathBuf,
    registry: Arc<BloomRegistry>,
}

impl QueryEngine {
    /// Creates an engine over `segment_dir`.
    pub fn new(segment_dir: impl AsRef<Path>, registry: Arc<BloomRegistry>) -> Self {
        Self {
            segment_dir: segment_dir.as_ref().to_path_buf(),
            registry,
        }
    }

    /// Runs `query`.
    ///
    /// Segments are visited newest first until `limit` matches have been
    /// collected; the collected set is then sorted by timestamp descending
    /// and truncated. A segment with no bloom index is always scanned. A
    /// missing segment directory yields no results.
    ///
    /// # Errors
    ///
    /// Returns an error if the segment directory cannot be listed or a
    /// segment cannot be read.
    pub fn query(&self, query: &LogQuery) -> Result<QueryResponse> {
        let started = Instant::now();
        let limit = query.effective_limit();
        let filter = Filter::new(query);

        let mut segments = list_indexed(&self.segment_dir, FileKind::Segment)?;
        segments.reverse();

        let mut collected = Vec::new();
        let mut scanned = 0usize;
        let mut skipped = 0usize;
        for segment in segments {
            if collected.len() >= limit {
                break;
            }
            if let Some(bloom) = self.registry.get(&segment_name(segment.index)) {
                if !filter.may_match(&bloom) {
                    skipped += 1;
                    continue;
                }
            }

            let bytes = match fs::read(&segment.path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("Segment {} vanished during query", segment.path.display());
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            scanned += 1;
            for record in RecordIter::new(&bytes) {
                if collected.len() >= limit {
                    break;
                }
                if filter.matches(&record) {
                    collected.push(record);
                }
            }
        }

        collected.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        collected.truncate(limit);

        let took_ms = started.elapsed().as_millis() as u64;
        debug!(
            "Query returned {} records ({} segments scanned, {} skipped) in {} ms",
            collected.len(),
            scanned,
            skipped,
            took_ms
        );

        Ok(QueryResponse {
            count: collected.len(),
            records: collected,
            took_ms,
        })
    }

    /// Returns up to `limit` records without filters, newest first.
    pub fn list_recent(&self, limit: i64) -> Result<Vec<LogRecord>> {
        Ok(self.query(&LogQuery::recent(limit))?.records)
    }

    /// Segment directory.
    pub fn segment_dir(&self) -> &Path {
        &self.segment_dir
    }
}
