use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One position of a byte pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternByte {
    Exact(u8),
    Wildcard,
}

impl PatternByte {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, PatternByte::Wildcard)
    }

    pub fn matches(&self, byte: u8) -> bool {
        match self {
            PatternByte::Exact(value) => *value == byte,
            PatternByte::Wildcard => true,
        }
    }
}

/// Byte template for the opening instructions of a routine.
///
/// Serialized as a hex string with `??` for wildcards, e.g. `"48 ?? 8B C3"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BytePattern {
    bytes: Vec<PatternByte>,
}

impl BytePattern {
    pub fn new(bytes: Vec<PatternByte>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidPattern("Signature pattern is empty".to_string()));
        }
        Ok(Self { bytes })
    }

    /// Pattern matching `bytes` exactly
    pub fn exact(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes.iter().copied().map(PatternByte::Exact).collect())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[PatternByte] {
        &self.bytes
    }

    pub fn wildcard_count(&self) -> usize {
        self.bytes.iter().filter(|b| b.is_wildcard()).count()
    }

    /// First non-wildcard position and its value
    pub fn anchor(&self) -> Option<(usize, u8)> {
        self.bytes.iter().enumerate().find_map(|(i, b)| match b {
            PatternByte::Exact(value) => Some((i, *value)),
            PatternByte::Wildcard => None,
        })
    }

    /// Compare against a window of exactly `len()` bytes
    pub fn matches(&self, window: &[u8]) -> bool {
        window.len() == self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(window)
                .all(|(pattern, byte)| pattern.matches(*byte))
    }
}

impl FromStr for BytePattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(parse_pattern(s)?)
    }
}

impl TryFrom<String> for BytePattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BytePattern> for String {
    fn from(pattern: BytePattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for BytePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_pattern(&self.bytes))
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<PatternByte>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(PatternByte::Wildcard);
            continue;
        }

        let value = u8::from_str_radix(token, 16).map_err(|e| {
            Error::InvalidPattern(format!("Invalid signature token '{}': {}", token, e))
        })?;
        bytes.push(PatternByte::Exact(value));
    }

    if bytes.is_empty() {
        return Err(Error::InvalidPattern("Signature pattern is empty".to_string()));
    }

    Ok(bytes)
}

pub fn format_pattern(bytes: &[PatternByte]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            PatternByte::Exact(value) => format!("{:02X}", value),
            PatternByte::Wildcard => "??".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
