//! Ingestion: the non-blocking producer handle, the batching consumer task,
//! and the flush pipeline it drives.

mod batcher;
mod pipeline;

pub use batcher::{Batcher, Ingestor};
pub use pipeline::FlushPipeline;
