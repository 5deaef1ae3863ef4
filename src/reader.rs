//! Indexed extraction: one seek and one read per range.
//!
//! [`RandomAccessReader::read_range`] turns `begin..end` into one absolute
//! byte span, from `offsets[begin]` to the end of message `end - 1`'s
//! payload, reads it with a single bounded read, and slices it into per-message [`MessageSpan`]s using the
//! offsets already in the index.  Separators and length prefixes are framing
//! metadata and never appear inside a span.
//!
//! # Stream lifetime
//! A read whose range reaches `message_count()` closes the stream once the
//! bytes are in memory; later reads fail with [`TraceError::ClosedStream`].
//! Construct the reader with `retain_stream = true` to keep the stream open
//! for repeated access instead.

use std::sync::Arc;

use crate::codec::PayloadCodec;
use crate::error::{Result, TraceError};
use crate::index::TraceIndex;
use crate::source::StreamHandle;

/// Byte range of one message inside a [`SpanBatch`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSpan {
    pub begin: usize,
    pub end:   usize,
}

impl MessageSpan {
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// The bytes of a contiguous message range and where each message sits.
#[derive(Debug, Clone)]
pub struct SpanBatch {
    first_index: usize,
    buffer:      Vec<u8>,
    spans:       Vec<MessageSpan>,
}

impl SpanBatch {
    /// Index of the first message in the batch.
    pub fn first_index(&self) -> usize {
        self.first_index
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[MessageSpan] {
        &self.spans
    }

    pub fn get(&self, i: usize) -> Option<&[u8]> {
        self.spans.get(i).map(|s| &self.buffer[s.begin..s.end])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.spans.iter().map(move |s| &self.buffer[s.begin..s.end])
    }
}

pub struct RandomAccessReader {
    stream:        StreamHandle,
    index:         TraceIndex,
    retain_stream: bool,
}

impl RandomAccessReader {
    pub fn new(stream: StreamHandle, index: TraceIndex, retain_stream: bool) -> Self {
        Self { stream, index, retain_stream }
    }

    pub fn index(&self) -> &TraceIndex {
        &self.index
    }

    pub fn message_count(&self) -> usize {
        self.index.message_count()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    pub fn close(&mut self) {
        self.stream.close();
    }

    fn check_range(&self, begin: usize, end: usize) -> Result<()> {
        let count = self.index.message_count();
        if begin >= end || end > count {
            return Err(TraceError::InvalidRange { begin, end, count });
        }
        Ok(())
    }

    /// Read messages `begin..end` with one seek and one read.
    pub fn read_range(&mut self, begin: usize, end: usize) -> Result<SpanBatch> {
        self.check_range(begin, end)?;
        if self.stream.is_closed() {
            return Err(TraceError::ClosedStream);
        }

        let ranges: Vec<_> = (begin..end)
            .filter_map(|i| self.index.payload_range(i))
            .collect();
        let (Some(first), Some(last)) = (self.index.offset_of(begin), ranges.last()) else {
            return Err(TraceError::InvalidRange { begin, end, count: self.index.message_count() });
        };
        let extent = last.end.checked_sub(first).ok_or_else(|| {
            TraceError::CorruptIndex(format!(
                "message {} ends at {} before message {begin} starts at {first}",
                end - 1, last.end
            ))
        })?;

        self.stream.seek(first)?;
        let buffer = self.stream.read(extent as usize)?;
        if (buffer.len() as u64) < extent {
            return Err(TraceError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {extent} bytes at offset {first}, read {}", buffer.len()),
            )));
        }

        let spans = ranges
            .iter()
            .map(|r| MessageSpan {
                begin: (r.start - first) as usize,
                end:   (r.end - first) as usize,
            })
            .collect();

        if end == self.index.message_count() && !self.retain_stream {
            self.stream.close();
        }

        Ok(SpanBatch { first_index: begin, buffer, spans })
    }

    /// Read `begin..end` and decode each message lazily with `codec`.
    pub fn decode_range<M>(
        &mut self,
        begin: usize,
        end:   usize,
        codec: Arc<dyn PayloadCodec<M>>,
    ) -> Result<Messages<M>> {
        let batch = self.read_range(begin, end)?;
        Ok(Messages { batch, codec, next: 0 })
    }
}

/// Lazily decoded messages of one range read.
///
/// A message that fails to decode yields [`TraceError::PayloadDecode`];
/// iteration continues with the next message.
pub struct Messages<M> {
    batch: SpanBatch,
    codec: Arc<dyn PayloadCodec<M>>,
    next:  usize,
}

impl<M> Messages<M> {
    pub(crate) fn empty(codec: Arc<dyn PayloadCodec<M>>) -> Self {
        let batch = SpanBatch { first_index: 0, buffer: Vec::new(), spans: Vec::new() };
        Self { batch, codec, next: 0 }
    }

    /// Undecoded bytes of the whole range.
    pub fn batch(&self) -> &SpanBatch {
        &self.batch
    }
}

impl<M> Iterator for Messages<M> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Self::Item> {
        let i     = self.next;
        let bytes = self.batch.get(i)?;
        self.next += 1;
        let index = self.batch.first_index + i;
        Some(self.codec.decode(bytes).map_err(|source| TraceError::PayloadDecode { index, source }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.batch.len() - self.next;
        (left, Some(left))
    }
}

impl<M> ExactSizeIterator for Messages<M> {}
