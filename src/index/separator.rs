//! Separator scan: discover message starts by searching for a fixed token.
//!
//! # How it works
//!
//! Starting at the current message, the stream is read in `chunk_size`
//! pieces.  The search window holds at most the two most recent chunks
//! joined together, so a separator split across a chunk boundary is still
//! seen while memory stays bounded by two chunks.  When the separator is
//! found its absolute offset is
//!
//! ```text
//! stream position after the read - window length + index in window
//! ```
//!
//! the next message starts right after it, and the scan seeks there and
//! starts a fresh window.
//!
//! ## End of stream
//!
//! A short read means the window already holds the rest of the stream.  All
//! remaining separators are then located in memory with no further reads.
//! A separator that ends exactly at end of stream is dangling: it closes the
//! last message and does not open an empty one.  A final message with no
//! separator after it is kept, and the index is marked truncated.
//!
//! ## Degenerate streams
//!
//! An empty stream, or one consisting of a single separator, holds no
//! messages.

use crate::error::{Result, TraceError};
use crate::framing::{find, FramingMode};
use crate::index::{Indexer, ProgressFn, TraceIndex};
use crate::source::StreamHandle;

pub struct SeparatorIndexer {
    separator:  Vec<u8>,
    chunk_size: usize,
}

impl SeparatorIndexer {
    pub fn new(separator: impl Into<Vec<u8>>, chunk_size: usize) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(TraceError::InvalidConfig("separator must not be empty".into()));
        }
        // Two chunks must always be able to hold a straddling separator.
        if chunk_size < separator.len() {
            return Err(TraceError::InvalidConfig(format!(
                "chunk size {chunk_size} is smaller than the {}-byte separator",
                separator.len()
            )));
        }
        Ok(Self { separator, chunk_size })
    }
}

/// The two most recently read chunks, joined.
#[derive(Default)]
struct Window {
    bytes:      Vec<u8>,
    last_chunk: usize,
    chunks:     usize,
}

impl Window {
    fn clear(&mut self) {
        self.bytes.clear();
        self.last_chunk = 0;
        self.chunks     = 0;
    }

    fn push(&mut self, chunk: &[u8]) {
        if self.chunks == 2 {
            let older = self.bytes.len() - self.last_chunk;
            self.bytes.drain(..older);
            self.chunks = 1;
        }
        self.bytes.extend_from_slice(chunk);
        self.last_chunk = chunk.len();
        self.chunks    += 1;
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Indexer for SeparatorIndexer {
    fn framing(&self) -> FramingMode {
        FramingMode::separator(self.separator.clone())
    }

    fn build_index(
        &self,
        stream:       &mut StreamHandle,
        max_messages: Option<usize>,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<TraceIndex> {
        let size    = stream.size()?;
        let sep_len = self.separator.len() as u64;
        let cap     = max_messages.unwrap_or(usize::MAX);

        let mut offsets: Vec<u64> = Vec::new();
        let mut window     = Window::default();
        // Start of the message whose separator is being searched for.
        let mut start      = 0u64;
        let mut terminated = true;
        let mut eof        = size == 0;

        while !eof && offsets.len() < cap {
            window.clear();
            stream.seek(start)?;

            let found = loop {
                let chunk = stream.read(self.chunk_size)?;
                eof = chunk.len() < self.chunk_size;
                window.push(&chunk);
                log::trace!(
                    "separator search: {} byte window ending at {}",
                    window.bytes().len(), stream.position()?
                );
                if let Some(at) = find(window.bytes(), &self.separator) {
                    break Some(at);
                }
                if eof {
                    break None;
                }
            };

            let scanned = stream.position()?;
            if let Some(ref mut cb) = progress {
                cb(scanned, size);
            }

            let Some(at) = found else {
                // Stream ended inside the current message.
                if start < size {
                    offsets.push(start);
                    terminated = false;
                }
                break;
            };

            let window_start = scanned - window.bytes().len() as u64;
            offsets.push(start);
            start = window_start + at as u64 + sep_len;

            if eof {
                // The window holds everything up to end of stream.
                let mut rest = &window.bytes()[at + self.separator.len()..];
                while offsets.len() < cap && start < size {
                    offsets.push(start);
                    match find(rest, &self.separator) {
                        Some(at) => {
                            start += at as u64 + sep_len;
                            rest   = &rest[at + self.separator.len()..];
                        }
                        None => {
                            terminated = false;
                            start      = size;
                        }
                    }
                }
            }
        }

        let mut usable_size = if terminated { start } else { size };

        // A lone separator frames nothing.
        if offsets.len() == 1 && terminated && size == sep_len {
            offsets.clear();
            usable_size = 0;
        }

        stream.seek(usable_size)?;
        Ok(TraceIndex::new(self.framing(), offsets, usable_size, !terminated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index(data: &[u8], sep: &[u8], chunk: usize, cap: Option<usize>) -> TraceIndex {
        let mut stream = StreamHandle::from_reader(Cursor::new(data.to_vec()), "mem");
        SeparatorIndexer::new(sep, chunk)
            .unwrap()
            .build_index(&mut stream, cap, None)
            .unwrap()
    }

    #[test]
    fn window_keeps_two_chunks() {
        let mut w = Window::default();
        w.push(b"ab");
        w.push(b"cd");
        assert_eq!(w.bytes(), b"abcd");
        w.push(b"e");
        assert_eq!(w.bytes(), b"cde");
        w.push(b"");
        assert_eq!(w.bytes(), b"e");
    }

    #[test]
    fn reference_example() {
        let idx = index(b"A$$BB$$C", b"$$", 1_000, None);
        assert_eq!(idx.offsets(), &[0, 3, 7]);
        assert_eq!(idx.usable_size(), 8);
        assert!(idx.is_truncated());
    }

    #[test]
    fn same_result_for_every_chunk_size() {
        let data = b"first$$__$$second$$__$$$$__$$fourth$$__$$";
        let expected = index(data, b"$$__$$", 1_000, None);
        assert_eq!(expected.offsets(), &[0, 11, 23, 29]);
        assert!(!expected.is_truncated());
        for chunk in 6..data.len() + 2 {
            assert_eq!(index(data, b"$$__$$", chunk, None), expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn cap_stops_after_closing_separator() {
        let idx = index(b"A$$BB$$C$$", b"$$", 3, Some(2));
        assert_eq!(idx.offsets(), &[0, 3]);
        assert_eq!(idx.usable_size(), 7);
        assert!(!idx.is_truncated());
    }

    #[test]
    fn cap_inside_in_memory_tail() {
        let idx = index(b"A$$BB$$C$$", b"$$", 1_000, Some(2));
        assert_eq!(idx.offsets(), &[0, 3]);
        assert_eq!(idx.usable_size(), 7);
    }

    #[test]
    fn degenerate_streams_hold_nothing() {
        assert_eq!(index(b"", b"$$", 4, None).message_count(), 0);
        let lone = index(b"$$", b"$$", 4, None);
        assert_eq!(lone.message_count(), 0);
        assert_eq!(lone.usable_size(), 0);
    }

    #[test]
    fn chunk_smaller_than_separator_is_rejected() {
        assert!(matches!(
            SeparatorIndexer::new(b"$$__$$".to_vec(), 4),
            Err(TraceError::InvalidConfig(_))
        ));
    }
}
