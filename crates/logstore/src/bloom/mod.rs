//! Bloom indexes used to skip segments during queries.
//!
//! - [`BloomFilter`]: the bit array and its probes.
//! - [`SegmentBloom`]: a filter plus the segment's timestamp range, persisted
//!   as a `.bf` sidecar next to the segment.
//! - [`BloomRegistry`]: the in-memory map queries consult.

mod filter;
mod registry;
mod segment;

pub use filter::BloomFilter;
pub use registry::BloomRegistry;
pub use segment::{SegmentBloom, SegmentBloomBuilder};
