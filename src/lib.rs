//! Random-access reading of framed message traces.
//!
//! A trace is a file of messages stored back to back, either delimited by a
//! fixed separator or preceded by a little-endian length.  Opening a trace
//! scans it once into a [`TraceIndex`]; any message or contiguous range is
//! then one seek and one read away.  `.xz` and `.lzma` traces are inflated
//! transparently.

pub mod error;
pub mod framing;
pub mod source;
pub mod index;
pub mod reader;
pub mod codec;
pub mod writer;
pub mod trace;

pub use error::{Result, TraceError};
pub use framing::FramingMode;
pub use source::StreamHandle;
pub use index::{Indexer, LengthPrefixIndexer, SeparatorIndexer, TraceIndex};
pub use reader::{Messages, MessageSpan, RandomAccessReader, SpanBatch};
pub use codec::{CodecRegistry, JsonCodec, PayloadCodec, RawCodec};
pub use writer::TraceWriter;
pub use trace::{Trace, TraceOptions};
