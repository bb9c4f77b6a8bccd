//! Ingestion buffer and the batching consumer task.
//!
//! ```text
//! Ingestor::submit ─→ [unbounded mpsc] ─→ Batcher task ─→ spawn_blocking(FlushPipeline::flush)
//! ```
//!
//! The batcher emits a batch when `max_records` records have accumulated
//! or `max_wait` has elapsed since the last emission, whichever comes
//! first. Empty batches are never emitted.

use crate::config::BatchConfig;
use crate::error::{Result, StoreError};
use crate::ingest::FlushPipeline;
use crate::record::LogRecord;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

/// Messages accepted by the batcher task.
#[derive(Debug)]
enum IngestMsg {
    /// A record to buffer.
    Record(LogRecord),
    /// Flush what is buffered, seal, and exit.
    Shutdown,
}

enum Event {
    Message(Option<IngestMsg>),
    Deadline,
}

/// Producer handle for the ingestion buffer.
///
/// Cheap to clone; submitting never blocks.
#[derive(Debug, Clone)]
pub struct Ingestor {
    tx: mpsc::UnboundedSender<IngestMsg>,
}

impl Ingestor {
    /// Buffers a record for the next batch.
    ///
    /// Returns as soon as the record is queued; it becomes queryable once
    /// its batch has been flushed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BatcherStopped`] if the batcher has exited.
    pub fn submit(&self, record: LogRecord) -> Result<()> {
        self.tx
            .send(IngestMsg::Record(record))
            .map_err(|_| StoreError::BatcherStopped)
    }

    /// Asks the batcher to flush, seal, and exit.
    pub fn request_shutdown(&self) -> Result<()> {
        self.tx
            .send(IngestMsg::Shutdown)
            .map_err(|_| StoreError::BatcherStopped)
    }

    /// Returns true if the batcher has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The single consumer of the ingestion buffer.
pub struct Batcher {
    rx: mpsc::UnboundedReceiver<IngestMsg>,
    pipeline: Option<FlushPipeline>,
    max_records: usize,
    max_wait: Duration,
}

impl Batcher {
    /// Spawns the batcher task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(pipeline: FlushPipeline, config: &BatchConfig) -> (Ingestor, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let batcher = Self {
            rx,
            pipeline: Some(pipeline),
            max_records: config.max_records.max(1),
            max_wait: config.max_wait(),
        };
        let handle = tokio::spawn(batcher.run());
        (Ingestor { tx }, handle)
    }

    async fn run(mut self) {
        info!(
            "Batcher started (max_records={}, max_wait={:?})",
            self.max_records, self.max_wait
        );

        let mut batch = Vec::with_capacity(self.max_records);
        let mut deadline = Instant::now() + self.max_wait;

        loop {
            let event = tokio::select! {
                msg = self.rx.recv() => Event::Message(msg),
                _ = sleep_until(deadline) => Event::Deadline,
            };

            match event {
                Event::Message(Some(IngestMsg::Record(record))) => {
                    batch.push(record);
                    if batch.len() >= self.max_records {
                        if !self.emit(&mut batch).await {
                            return;
                        }
                        deadline = Instant::now() + self.max_wait;
                    }
                }
                Event::Message(Some(IngestMsg::Shutdown)) | Event::Message(None) => break,
                Event::Deadline => {
                    if !batch.is_empty() && !self.emit(&mut batch).await {
                        return;
                    }
                    deadline = Instant::now() + self.max_wait;
                }
            }
        }

        // refuse new records, then take everything already queued
        self.rx.close();
        while let Ok(msg) = self.rx.try_recv() {
            if let IngestMsg::Record(record) = msg {
                batch.push(record);
                if batch.len() >= self.max_records && !self.emit(&mut batch).await {
                    return;
                }
            }
        }
        if !batch.is_empty() && !self.emit(&mut batch).await {
            return;
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            match tokio::task::spawn_blocking(move || pipeline.seal()).await {
                Ok(Ok(())) => info!("Batcher stopped"),
                Ok(Err(e)) => error!("Failed to seal on shutdown: {}", e),
                Err(e) => error!("Seal task failed: {}", e),
            }
        }
    }

    /// Flushes `batch` on the blocking pool. Returns false if the pipeline
    /// was lost and the batcher must stop.
    async fn emit(&mut self, batch: &mut Vec<LogRecord>) -> bool {
        let Some(mut pipeline) = self.pipeline.take() else {
            return false;
        };
        let records = std::mem::replace(batch, Vec::with_capacity(self.max_records));
        let count = records.len();

        let joined = tokio::task::spawn_blocking(move || {
            let result = pipeline.flush(&records);
            (pipeline, result)
        })
        .await;

        match joined {
            Ok((pipeline, result)) => {
                match result {
                    Ok(wal_index) => debug!("Emitted batch of {} records (wal={})", count, wal_index),
                    Err(e) => error!("Failed to flush batch of {} records: {}", count, e),
                }
                self.pipeline = Some(pipeline);
                true
            }
            Err(e) => {
                error!("Flush task for {} records failed, stopping batcher: {}", count, e);
                false
            }
        }
    }
}
