//! Framing conventions for traces.
//!
//! | Mode | On-disk frame |
//! |------|---------------|
//! | `SeparatorDelimited` | `payload ‖ separator` |
//! | `LengthPrefixed` | `len (prefix_width bytes, LE) ‖ payload` |
//!
//! A trace uses exactly one mode for its whole length.  Length prefixes are
//! always little-endian; there is no byte-order negotiation.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::error::{Result, TraceError};

/// Separator written after every message by the reference encoders.
pub const DEFAULT_SEPARATOR:    &[u8] = b"$$__$$";
/// Width of the length prefix written by the reference encoders (`u32`).
pub const DEFAULT_PREFIX_WIDTH: usize = 4;
/// Widest length prefix that still decodes into a `u64`.
pub const MAX_PREFIX_WIDTH:     usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FramingMode {
    SeparatorDelimited { separator: Vec<u8> },
    LengthPrefixed { prefix_width: usize },
}

impl FramingMode {
    pub fn separator(separator: impl Into<Vec<u8>>) -> Self {
        FramingMode::SeparatorDelimited { separator: separator.into() }
    }

    pub fn length_prefixed(prefix_width: usize) -> Self {
        FramingMode::LengthPrefixed { prefix_width }
    }

    /// Reject framings that cannot delimit anything.
    pub fn validate(&self) -> Result<()> {
        match self {
            FramingMode::SeparatorDelimited { separator } if separator.is_empty() => {
                Err(TraceError::InvalidConfig("separator must not be empty".into()))
            }
            FramingMode::LengthPrefixed { prefix_width }
                if *prefix_width == 0 || *prefix_width > MAX_PREFIX_WIDTH =>
            {
                Err(TraceError::InvalidConfig(format!(
                    "length prefix width must be 1..={MAX_PREFIX_WIDTH}, got {prefix_width}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Bytes of framing metadata stored after each payload.
    pub fn trailer_len(&self) -> u64 {
        match self {
            FramingMode::SeparatorDelimited { separator } => separator.len() as u64,
            FramingMode::LengthPrefixed { .. }            => 0,
        }
    }

    /// Bytes of framing metadata stored before each payload.
    pub fn header_len(&self) -> u64 {
        match self {
            FramingMode::SeparatorDelimited { .. }     => 0,
            FramingMode::LengthPrefixed { prefix_width } => *prefix_width as u64,
        }
    }
}

impl Default for FramingMode {
    fn default() -> Self {
        FramingMode::separator(DEFAULT_SEPARATOR)
    }
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingMode::SeparatorDelimited { separator } => {
                write!(f, "separator(0x{})", hex::encode(separator))
            }
            FramingMode::LengthPrefixed { prefix_width } => {
                write!(f, "length-prefixed({prefix_width} bytes, LE)")
            }
        }
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
