//! Binary record framing shared by WAL files and segments.
//!
//! ## Record Layout
//!
//! ```text
//! Offset  Size    Field
//! ------  ----    -----
//! 0x00    8       timestamp (i64 BE, epoch millis)
//! 0x08    1       level code (u8)
//! 0x09    2       message length N (u16 BE)
//! 0x0B    N       message (UTF-8)
//! ```
//!
//! Files are a plain concatenation of records. Decoding is defensive: a
//! short header, a length beyond the remaining bytes, or a length above
//! [`MAX_MESSAGE_LEN`] ends the stream instead of raising an error, so a
//! record torn by a crash mid-append reads as "no more records".

use crate::record::{Level, LogRecord, MAX_MESSAGE_LEN};

/// Fixed header size in bytes.
pub const HEADER_LEN: usize = 11;

/// Outcome of decoding one record from the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete record and the number of bytes it occupied.
    Record(LogRecord, usize),
    /// No complete record remains (empty buffer or torn tail).
    EndOfStream,
    /// The declared message length exceeds the sanity ceiling.
    Corrupt,
}

/// Returns the encoded size of a record.
pub fn encoded_len(record: &LogRecord) -> usize {
    HEADER_LEN + record.message().len()
}

/// Appends the encoding of `record` to `buf`.
pub fn encode_into(record: &LogRecord, buf: &mut Vec<u8>) {
    let message = record.message().as_bytes();
    // LogRecord::new bounds messages well below u16::MAX
    let len = message.len().min(u16::MAX as usize) as u16;

    buf.extend_from_slice(&record.timestamp().to_be_bytes());
    buf.push(record.level().as_code());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&message[..len as usize]);
}

/// Encodes a single record.
pub fn encode(record: &LogRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len(record));
    encode_into(record, &mut buf);
    buf
}

/// Encodes a batch into one contiguous buffer.
pub fn encode_batch(records: &[LogRecord]) -> Vec<u8> {
    let size = records.iter().map(encoded_len).sum();
    let mut buf = Vec::with_capacity(size);
    for record in records {
        encode_into(record, &mut buf);
    }
    buf
}

/// Decodes the record at the front of `bytes`.
pub fn decode(bytes: &[u8]) -> Decoded {
    if bytes.len() < HEADER_LEN {
        return Decoded::EndOfStream;
    }

    let mut ts = [0u8; 8];
    ts.copy_from_slice(&bytes[0..8]);
    let timestamp = i64::from_be_bytes(ts);
    let level = Level::from_code(bytes[8]);
    let len = u16::from_be_bytes([bytes[9], bytes[10]]) as usize;

    if len > MAX_MESSAGE_LEN {
        return Decoded::Corrupt;
    }
    let end = HEADER_LEN + len;
    if end > bytes.len() {
        return Decoded::EndOfStream;
    }

    let message = String::from_utf8_lossy(&bytes[HEADER_LEN..end]).into_owned();
    Decoded::Record(LogRecord::new(timestamp, level, message), end)
}

/// Why a [`RecordIter`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All bytes were consumed by complete records.
    Exhausted,
    /// Trailing bytes did not form a complete record.
    Truncated,
    /// A record declared an oversized message.
    Corrupt,
}

/// Iterates the complete records of an in-memory file image.
#[derive(Debug)]
pub struct RecordIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    stop: Option<StopReason>,
}

impl<'a> RecordIter<'a> {
    /// Creates an iterator over `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            stop: None,
        }
    }

    /// Bytes consumed by the records yielded so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left unread behind the last yielded record.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    /// Returns why iteration stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }
}

impl Iterator for RecordIter<'_> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }
        match decode(&self.bytes[self.offset..]) {
            Decoded::Record(record, len) => {
                self.offset += len;
                Some(record)
            }
            Decoded::EndOfStream => {
                self.stop = Some(if self.remaining() == 0 {
                    StopReason::Exhausted
                } else {
                    StopReason::Truncated
                });
                None
            }
            Decoded::Corrupt => {
                self.stop = Some(StopReason::Corrupt);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_big_endian() {
        let record = LogRecord::new(0x0102_0304_0506_0708, Level::Error, "hi");
        let bytes = encode(&record);
        assert_eq!(
            bytes,
            vec![1, 2, 3, 4, 5, 6, 7, 8, 3, 0, 2, b'h', b'i']
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let record = LogRecord::new(-42, Level::Debug, "négatif ✓");
        let bytes = encode(&record);
        assert_eq!(decode(&bytes), Decoded::Record(record, bytes.len()));
    }

    #[test]
    fn test_decode_short_header_is_end_of_stream() {
        assert_eq!(decode(&[]), Decoded::EndOfStream);
        assert_eq!(decode(&[0u8; HEADER_LEN - 1]), Decoded::EndOfStream);
    }

    #[test]
    fn test_decode_torn_message_is_end_of_stream() {
        let bytes = encode(&LogRecord::new(1, Level::Info, "hello world"));
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Decoded::EndOfStream);
    }

    #[test]
    fn test_decode_oversized_length_is_corrupt() {
        let mut bytes = vec![0u8; 8];
        bytes.push(1);
        bytes.extend_from_slice(&((MAX_MESSAGE_LEN as u16) + 1).to_be_bytes());
        bytes.extend(std::iter::repeat(b'x').take(MAX_MESSAGE_LEN + 1));
        assert_eq!(decode(&bytes), Decoded::Corrupt);
    }

    #[test]
    fn test_unknown_level_code_decodes_as_unknown() {
        let mut bytes = encode(&LogRecord::new(5, Level::Info, "x"));
        bytes[8] = 99;
        match decode(&bytes) {
            Decoded::Record(record, _) => assert_eq!(record.level(), Level::Unknown),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_iter_stops_at_truncated_tail() {
        let records: Vec<LogRecord> = (0..5)
            .map(|i| LogRecord::new(i, Level::Info, format!("msg {}", i)))
            .collect();
        let mut bytes = encode_batch(&records);
        let complete = bytes.len();
        bytes.extend_from_slice(&[0xAB, 0xCD, 0xEF]);

        let mut iter = RecordIter::new(&bytes);
        let decoded: Vec<LogRecord> = iter.by_ref().collect();
        assert_eq!(decoded, records);
        assert_eq!(iter.offset(), complete);
        assert_eq!(iter.remaining(), 3);
        assert_eq!(iter.stop_reason(), Some(StopReason::Truncated));
    }

    #[test]
    fn test_iter_exhausted() {
        let bytes = encode_batch(&[LogRecord::new(1, Level::Warn, "a")]);
        let mut iter = RecordIter::new(&bytes);
        assert_eq!(iter.by_ref().count(), 1);
        assert_eq!(iter.stop_reason(), Some(StopReason::Exhausted));
    }
}
