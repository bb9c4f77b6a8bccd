//! Fixed-size bloom filter over UTF-8 strings.

use crate::error::{Result, StoreError};
use bitvec::prelude::*;
use std::io::{Read, Write};

/// Odd constant mixed with the probe seed.
const SEED_MIX: i32 = 0x5bd1_e995;

/// Upper bound on a serialized bit array, to reject garbage length prefixes.
const MAX_SERIALIZED_BYTES: usize = 256 * 1024 * 1024;

/// Bloom filter with `m` bits and `k` hash probes.
///
/// Probe `i` hashes the value's UTF-8 bytes as
/// `h = i * 0x5bd1e995; h = h * 31 + byte` (32-bit wrapping, signed bytes)
/// and sets bit `|h mod m|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates an empty filter with `num_bits` bits and `num_hashes` probes.
    ///
    /// `num_bits` is clamped to at least one bit.
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        Self {
            bits: bitvec![u8, Lsb0; 0; num_bits.max(1)],
            num_hashes,
        }
    }

    /// Number of bits (m).
    pub fn num_bits(&self) -> usize {
        self.bits.len()
    }

    /// Number of hash probes (k).
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    fn probe(&self, bytes: &[u8], seed: u32) -> usize {
        let mut h = (seed as i32).wrapping_mul(SEED_MIX);
        for &b in bytes {
            h = h.wrapping_mul(31).wrapping_add(b as i8 as i32);
        }
        (i64::from(h) % self.bits.len() as i64).unsigned_abs() as usize
    }

    /// Adds a value.
    pub fn add(&mut self, value: &str) {
        let bytes = value.as_bytes();
        for seed in 0..self.num_hashes {
            let idx = self.probe(bytes, seed);
            self.bits.set(idx, true);
        }
    }

    /// Returns `false` only if `value` was definitely never added.
    ///
    /// An absent value (`None`) is neutral and always returns `true`.
    pub fn might_contain<'a>(&self, value: impl Into<Option<&'a str>>) -> bool {
        let Some(value) = value.into() else {
            return true;
        };
        let bytes = value.as_bytes();
        (0..self.num_hashes).all(|seed| self.bits[self.probe(bytes, seed)])
    }

    /// Writes the filter: byte length, raw bit bytes, m, k (all big-endian).
    ///
    /// Fails for a filter of more than `u32::MAX` bits.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let raw = self.bits.as_raw_slice();
        let num_bits = u32::try_from(self.bits.len()).map_err(|_| {
            StoreError::CorruptBloomIndex(format!("{} bits do not fit a u32", self.bits.len()))
        })?;
        // fewer bytes than bits, so this fits whenever num_bits does
        writer.write_all(&(raw.len() as u32).to_be_bytes())?;
        writer.write_all(raw)?;
        writer.write_all(&num_bits.to_be_bytes())?;
        writer.write_all(&self.num_hashes.to_be_bytes())?;
        Ok(())
    }

    /// Reads a filter written by [`BloomFilter::write_to`].
    ///
    /// A bit array shorter than `m` bits is zero-padded, so writers that
    /// trim trailing zero bytes are accepted.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let byte_len = u32::from_be_bytes(buf4) as usize;
        if byte_len > MAX_SERIALIZED_BYTES {
            return Err(StoreError::CorruptBloomIndex(format!(
                "bit array length {} exceeds limit",
                byte_len
            )));
        }

        let mut raw = vec![0u8; byte_len];
        reader.read_exact(&mut raw)?;

        reader.read_exact(&mut buf4)?;
        let num_bits = u32::from_be_bytes(buf4) as usize;
        reader.read_exact(&mut buf4)?;
        let num_hashes = u32::from_be_bytes(buf4);

        if num_bits == 0 {
            return Err(StoreError::CorruptBloomIndex("zero-sized bit array".into()));
        }
        if byte_len > num_bits.div_ceil(8) {
            return Err(StoreError::CorruptBloomIndex(format!(
                "{} bytes cannot hold a {}-bit array",
                byte_len, num_bits
            )));
        }

        raw.resize(num_bits.div_ceil(8), 0);
        let mut bits = BitVec::<u8, Lsb0>::from_vec(raw);
        bits.truncate(num_bits);

        Ok(Self { bits, num_hashes })
    }
}
