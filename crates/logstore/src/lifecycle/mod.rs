//! WAL lifecycle: checkpoint tracking, cleanup, and startup replay.

pub mod checkpoint;
pub mod cleaner;
pub mod replay;

pub use checkpoint::CheckpointStore;
pub use cleaner::{CleanReport, WalCleaner};
pub use replay::{ReplayReport, WalReplayer};
