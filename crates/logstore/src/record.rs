//! Log record value type.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Epoch milliseconds.
pub type Timestamp = i64;

/// Largest message, in UTF-8 bytes, the decoder accepts as sane.
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Severity of a log record.
///
/// Each level has a one-byte on-disk code; code `0` and any code the
/// decoder does not recognise map to [`Level::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Level {
    /// Unrecognised or missing level.
    #[default]
    Unknown = 0,
    /// Informational.
    Info = 1,
    /// Warning.
    Warn = 2,
    /// Error.
    Error = 3,
    /// Debug output.
    Debug = 4,
}

impl Level {
    /// Returns the on-disk code.
    pub fn as_code(self) -> u8 {
        self as u8
    }

    /// Decodes an on-disk code.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Info,
            2 => Self::Warn,
            3 => Self::Error,
            4 => Self::Debug,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical upper-case name, as indexed by the bloom filter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }

    /// Parses a level name case-insensitively; unrecognised names map to
    /// `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "INFO" => Self::Info,
            "WARN" => Self::Warn,
            "ERROR" => Self::Error,
            "DEBUG" => Self::Debug,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// A single immutable log record.
///
/// Serializes as `{ "timestamp": .., "level": "INFO", "message": .. }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RecordFields")]
pub struct LogRecord {
    timestamp: Timestamp,
    level: Level,
    message: String,
}

impl LogRecord {
    /// Creates a record.
    ///
    /// Messages longer than [`MAX_MESSAGE_LEN`] bytes are cut at the last
    /// character boundary that fits, so every record stays decodable.
    pub fn new(timestamp: Timestamp, level: Level, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > MAX_MESSAGE_LEN {
            let mut end = MAX_MESSAGE_LEN;
            while !message.is_char_boundary(end) {
                end -= 1;
            }
            message.truncate(end);
        }
        Self {
            timestamp,
            level,
            message,
        }
    }

    /// Returns the timestamp in epoch milliseconds.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns the message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Lowercase whitespace-separated words of the message.
    pub fn tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.message.split_whitespace().map(str::to_lowercase)
    }
}

#[derive(Deserialize)]
struct RecordFields {
    timestamp: Timestamp,
    #[serde(default)]
    level: Level,
    message: String,
}

impl From<RecordFields> for LogRecord {
    fn from(fields: RecordFields) -> Self {
        Self::new(fields.timestamp, fields.level, fields.message)
    }
}
