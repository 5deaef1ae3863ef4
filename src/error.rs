//! Error taxonomy for opening, indexing and reading traces.
//!
//! Indexing errors abort the open operation and no partial index is ever
//! exposed.  Extraction errors are scoped to the messages being read and
//! leave the [`TraceIndex`](crate::index::TraceIndex) usable.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::codec::CodecError;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Trace not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },
    /// A length prefix could not be read in full.  Fatal to the index build.
    #[error("Corrupt framing at offset {offset}: length prefix needs {expected} bytes, {available} available")]
    CorruptFraming { offset: u64, expected: usize, available: usize },
    #[error("Invalid message range {begin}..{end} (trace holds {count} messages)")]
    InvalidRange { begin: usize, end: usize, count: usize },
    #[error("Unknown payload type tag: {0}")]
    UnknownTypeTag(String),
    /// One message failed to decode.  Remaining messages are still readable.
    #[error("Message {index} failed to decode: {source}")]
    PayloadDecode {
        index: usize,
        #[source]
        source: CodecError,
    },
    /// A payload codec failed outside of a trace read.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Stream is closed")]
    ClosedStream,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Frame {frame} payload contains the separator")]
    SeparatorInPayload { frame: u64 },
    #[error("An empty first frame reads back as a lone separator")]
    EmptyFirstFrame,
    #[error("Index is inconsistent: {0}")]
    CorruptIndex(String),
    #[error("Payload of {len} bytes does not fit a {prefix_width}-byte length prefix")]
    PayloadTooLarge { len: u64, prefix_width: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TraceError {
    /// Classify an error raised while opening `path`.
    pub(crate) fn from_open(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound         => TraceError::NotFound { path: path.to_owned() },
            io::ErrorKind::PermissionDenied => TraceError::PermissionDenied { path: path.to_owned() },
            _                               => TraceError::Io(err),
        }
    }

    /// True for errors scoped to a single message.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TraceError::PayloadDecode { .. } | TraceError::InvalidRange { .. })
    }
}
