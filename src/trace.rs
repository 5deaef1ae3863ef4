//! High-level [`Trace`] API: the primary embedding surface.
//!
//! ```no_run
//! use tracedex::codec::{CodecRegistry, RAW_TAG};
//! use tracedex::framing::FramingMode;
//! use tracedex::trace::{Trace, TraceOptions};
//!
//! let opts = TraceOptions { framing: FramingMode::length_prefixed(4), ..Default::default() };
//! let mut trace = Trace::open("run.osi.xz", RAW_TAG, &CodecRegistry::raw(), opts)?;
//! println!("{} messages", trace.message_count());
//! let third = trace.get_message(2)?;
//! # let _ = third;
//! # Ok::<(), tracedex::TraceError>(())
//! ```
//!
//! Opening a trace scans it once to build its index.  By default a read that
//! reaches the last message closes the underlying stream (see
//! [`crate::reader`]); call [`Trace::reopen`] or set
//! [`TraceOptions::retain_stream`] for repeated access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::codec::{CodecRegistry, PayloadCodec};
use crate::error::{Result, TraceError};
use crate::framing::FramingMode;
use crate::index::{ProgressFn, TraceIndex, DEFAULT_CHUNK_SIZE};
use crate::reader::{Messages, RandomAccessReader, SpanBatch};
use crate::source::StreamHandle;

// ── TraceOptions ──────────────────────────────────────────────────────────────

/// Configuration for [`Trace::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    pub framing:       FramingMode,
    /// Read size of the separator scan.  Ignored for length-prefixed traces.
    pub chunk_size:    usize,
    /// Stop indexing after this many messages.  `None` indexes everything.
    pub max_messages:  Option<usize>,
    /// Keep the stream open after a read reaches the last message.
    pub retain_stream: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            framing:       FramingMode::default(),
            chunk_size:    DEFAULT_CHUNK_SIZE,
            max_messages:  None,
            retain_stream: false,
        }
    }
}

impl TraceOptions {
    pub fn validate(&self) -> Result<()> {
        self.framing.validate()?;
        if self.chunk_size == 0 {
            return Err(TraceError::InvalidConfig("chunk size must be positive".into()));
        }
        Ok(())
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────────

pub struct Trace<M> {
    path:     PathBuf,
    type_tag: String,
    options:  TraceOptions,
    codec:    Arc<dyn PayloadCodec<M>>,
    reader:   RandomAccessReader,
}

impl<M> Trace<M> {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Open and index `path`, decoding payloads with the codec registered
    /// under `type_tag`.
    pub fn open<P: AsRef<Path>>(
        path:     P,
        type_tag: &str,
        registry: &CodecRegistry<M>,
        options:  TraceOptions,
    ) -> Result<Self> {
        Self::open_inner(path.as_ref(), type_tag, registry, options, None)
    }

    /// Like [`Trace::open`], reporting `(bytes_scanned, total_bytes)` while
    /// the index is built.
    pub fn open_with_progress<P, F>(
        path:     P,
        type_tag: &str,
        registry: &CodecRegistry<M>,
        options:  TraceOptions,
        progress: &mut F,
    ) -> Result<Self>
    where
        P: AsRef<Path>,
        F: FnMut(u64, u64),
    {
        Self::open_inner(path.as_ref(), type_tag, registry, options, Some(progress as &mut ProgressFn<'_>))
    }

    fn open_inner(
        path:     &Path,
        type_tag: &str,
        registry: &CodecRegistry<M>,
        options:  TraceOptions,
        progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<Self> {
        options.validate()?;
        let codec  = registry.resolve(type_tag)?;
        let reader = index_file(path, &options, progress)?;
        Ok(Self {
            path: path.to_owned(),
            type_tag: type_tag.to_owned(),
            options,
            codec,
            reader,
        })
    }

    /// Reopen the stream and rebuild the index.
    pub fn reopen(&mut self) -> Result<()> {
        self.reader.close();
        self.reader = index_file(&self.path, &self.options, None)?;
        Ok(())
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    pub fn message_count(&self) -> usize {
        self.reader.message_count()
    }

    pub fn index(&self) -> &TraceIndex {
        self.reader.index()
    }

    pub fn is_truncated(&self) -> bool {
        self.reader.index().is_truncated()
    }

    pub fn usable_size(&self) -> u64 {
        self.reader.index().usable_size()
    }

    /// Decode messages `begin..end`.  The range is read in one go; decoding
    /// happens as the sequence is consumed.
    pub fn get_messages(&mut self, begin: usize, end: usize) -> Result<Messages<M>> {
        self.reader.decode_range(begin, end, Arc::clone(&self.codec))
    }

    /// Decode every message.  Closes the stream unless it is retained.
    pub fn messages(&mut self) -> Result<Messages<M>> {
        match self.message_count() {
            0     => Ok(Messages::empty(Arc::clone(&self.codec))),
            count => self.get_messages(0, count),
        }
    }

    /// Decode message `i`.  Costs the same as a one-message range read.
    pub fn get_message(&mut self, i: usize) -> Result<M> {
        let count = self.message_count();
        let end   = i.saturating_add(1);
        self.get_messages(i, end)?
            .next()
            .unwrap_or(Err(TraceError::InvalidRange { begin: i, end, count }))
    }

    /// Undecoded payload bytes of messages `begin..end`.
    pub fn read_raw(&mut self, begin: usize, end: usize) -> Result<SpanBatch> {
        self.reader.read_range(begin, end)
    }

    // ── Lifetime ──────────────────────────────────────────────────────────────

    pub fn close(&mut self) {
        self.reader.close();
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path { &self.path }

    pub fn type_tag(&self) -> &str { &self.type_tag }

    pub fn options(&self) -> &TraceOptions { &self.options }
}

fn index_file(
    path:     &Path,
    options:  &TraceOptions,
    progress: Option<&mut ProgressFn<'_>>,
) -> Result<RandomAccessReader> {
    let mut stream = StreamHandle::open(path)?;
    let index = TraceIndex::build(
        &mut stream,
        &options.framing,
        options.chunk_size,
        options.max_messages,
        progress,
    )?;
    Ok(RandomAccessReader::new(stream, index, options.retain_stream))
}
