//! Alopex LogStore - durable log record storage
//!
//! This crate ingests timestamped log records, makes them durable in a
//! write-ahead log, stores them in rotating append-only segments, and
//! answers filtered queries while skipping segments by bloom index.
//!
//! # Components
//!
//! - [`LogStore`]: startup, ingestion, queries, and shutdown
//! - [`WalWriter`]: rotating write-ahead log
//! - [`SegmentWriter`] / [`QueryEngine`]: segment storage and its reader
//! - [`BloomFilter`] / [`SegmentBloom`]: per-segment skip indexes
//! - [`CheckpointStore`], [`WalCleaner`], [`WalReplayer`]: WAL lifecycle
//!
//! # Data Flow
//!
//! ```text
//! submit ─→ Batcher ─→ WAL append ─→ segment write ─→ checkpoint ─→ WAL cleanup
//!                                         │
//!                                   bloom registry ─→ QueryEngine
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_logstore::{Level, LogQuery, LogRecord, LogStore, StoreConfig};
//!
//! let store = LogStore::open(StoreConfig::new("data")).await?;
//! store.submit(LogRecord::new(100, Level::Info, "service started"))?;
//! store.submit(LogRecord::new(200, Level::Error, "connection refused"))?;
//!
//! // Records become queryable once their batch is flushed
//! let errors = store.query(LogQuery::recent(10).with_level("error")).await?;
//!
//! store.shutdown().await?;
//! ```

#![deny(missing_docs)]

pub mod bloom;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod lifecycle;
pub mod record;
pub mod segment;
pub mod store;
pub mod wal;

pub use bloom::{BloomFilter, BloomRegistry, SegmentBloom, SegmentBloomBuilder};
pub use config::{BatchConfig, BloomConfig, SegmentConfig, StoreConfig, SyncMode, WalConfig};
pub use error::{Result, StoreError};
pub use ingest::{Batcher, FlushPipeline, Ingestor};
pub use lifecycle::{CheckpointStore, CleanReport, ReplayReport, WalCleaner, WalReplayer};
pub use record::{Level, LogRecord, Timestamp};
pub use segment::{LogQuery, QueryEngine, QueryResponse, SegmentWriter};
pub use store::LogStore;
pub use wal::WalWriter;
