//! Segment storage: the canonical, queryable copy of every flushed batch.

pub mod reader;
pub mod writer;

pub use reader::{LogQuery, QueryEngine, QueryResponse, DEFAULT_QUERY_LIMIT};
pub use writer::SegmentWriter;
