//! The store facade: startup ordering, ingestion, queries, and shutdown.

use crate::bloom::BloomRegistry;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::ingest::{Batcher, FlushPipeline, Ingestor};
use crate::lifecycle::{CheckpointStore, ReplayReport, WalCleaner, WalReplayer};
use crate::record::LogRecord;
use crate::segment::{LogQuery, QueryEngine, QueryResponse, SegmentWriter};
use crate::wal::WalWriter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A running log store.
///
/// # Examples
/// ```rust,ignore
/// use alopex_logstore::{Level, LogQuery, LogRecord, LogStore, StoreConfig};
///
/// let store = LogStore::open(StoreConfig::new("/var/lib/logs")).await?;
/// store.submit(LogRecord::new(1_700_000_000_000, Level::Error, "disk full"))?;
///
/// let response = store.query(LogQuery::recent(10).with_level("ERROR")).await?;
/// store.shutdown().await?;
/// ```
#[derive(Debug)]
pub struct LogStore {
    config: StoreConfig,
    ingestor: Ingestor,
    batcher: JoinHandle<()>,
    engine: QueryEngine,
    checkpoint: Arc<CheckpointStore>,
    replay: ReplayReport,
}

impl LogStore {
    /// Opens the store under `config.data_dir` and starts ingestion.
    ///
    /// Startup order:
    /// 1. create the WAL and segment directories
    /// 2. load the checkpoint
    /// 3. load bloom sidecars (rebuilding missing ones if configured)
    /// 4. open the segment writer
    /// 5. replay WAL files above the checkpoint, then clean up
    /// 6. open the WAL writer above every existing index
    /// 7. spawn the batcher
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a directory cannot
    /// be created, the checkpoint is malformed, or replay fails.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let layout = config.layout();
        layout.create_dirs()?;

        let checkpoint = Arc::new(CheckpointStore::load(layout.checkpoint_path())?);

        let registry = Arc::new(BloomRegistry::new());
        registry.load(&layout.segment_dir())?;
        if config.rebuild_missing_indexes {
            registry.rebuild_missing(&layout.segment_dir(), config.bloom)?;
        }

        let mut segments = SegmentWriter::open(
            layout.segment_dir(),
            config.segment,
            config.bloom,
            Arc::clone(&registry),
            Arc::clone(&checkpoint),
        )?;

        let cleaner = WalCleaner::new(layout.wal_dir(), Arc::clone(&checkpoint));
        let replayer = WalReplayer::new(layout.wal_dir(), Arc::clone(&checkpoint), cleaner.clone());
        let replay = replayer.replay(&mut segments)?;

        let wal = WalWriter::open(layout.wal_dir(), config.wal, checkpoint.last_flushed())?;

        let pipeline = FlushPipeline::new(wal, segments, cleaner);
        let (ingestor, batcher) = Batcher::spawn(pipeline, &config.batch);

        info!(
            "Log store open at {} (checkpoint={}, {} records replayed)",
            layout.data_dir().display(),
            checkpoint.last_flushed(),
            replay.records_replayed
        );

        Ok(Self {
            config,
            ingestor,
            batcher,
            engine: QueryEngine::new(layout.segment_dir(), registry),
            checkpoint,
            replay,
        })
    }

    /// Buffers a record for ingestion and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BatcherStopped`] if the batcher has exited.
    pub fn submit(&self, record: LogRecord) -> Result<()> {
        self.ingestor.submit(record)
    }

    /// Returns a producer handle that can be moved to other tasks.
    pub fn ingestor(&self) -> Ingestor {
        self.ingestor.clone()
    }

    /// Runs a query on the blocking pool.
    pub async fn query(&self, query: LogQuery) -> Result<QueryResponse> {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || engine.query(&query)).await?
    }

    /// Returns up to `limit` most recent records.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<LogRecord>> {
        Ok(self.query(LogQuery::recent(limit)).await?.records)
    }

    /// The query engine, for synchronous callers.
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Highest WAL index reflected in segments.
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint.last_flushed()
    }

    /// What startup replay recovered.
    pub fn replay_report(&self) -> &ReplayReport {
        &self.replay
    }

    /// The configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Flushes buffered records, seals the open segment, and waits for the
    /// batcher to exit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Task`] if the batcher task panicked.
    pub async fn shutdown(self) -> Result<()> {
        if let Err(StoreError::BatcherStopped) = self.ingestor.request_shutdown() {
            warn!("Batcher already stopped before shutdown");
        }
        self.batcher.await?;
        info!("Log store shut down (checkpoint={})", self.checkpoint.last_flushed());
        Ok(())
    }
}
