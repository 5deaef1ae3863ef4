//! Message offset table and the strategies that build it.
//!
//! An index is built exactly once per open by a single forward pass over the
//! stream.  Every later access is an O(1) offset lookup plus one bounded
//! read; nothing here rescans the trace.
//!
//! # Invariants
//! - `offsets` is strictly increasing and starts at 0 whenever non-empty.
//! - `offsets[i] < offsets[i + 1] <= usable_size`.
//! - `offsets.len() == message_count()`.

pub mod length_prefix;
pub mod separator;

use std::ops::Range;

use crate::framing::FramingMode;
use crate::source::StreamHandle;
use crate::error::Result;

pub use length_prefix::LengthPrefixIndexer;
pub use separator::SeparatorIndexer;

/// Default read size for the separator scan: 1,000,000 bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Called with `(bytes_scanned, total_bytes)` while an index is built.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + 'a;

/// One boundary-discovery strategy.  Strategies share no state and a trace
/// is never indexed by more than one of them.
pub trait Indexer {
    fn framing(&self) -> FramingMode;

    /// Scan `stream` from offset 0.  Stops early once `max_messages` frames
    /// are known, leaving the stream positioned just past the last of them.
    fn build_index(
        &self,
        stream:       &mut StreamHandle,
        max_messages: Option<usize>,
        progress:     Option<&mut ProgressFn<'_>>,
    ) -> Result<TraceIndex>;
}

/// Pick the strategy matching `framing`.
pub fn indexer_for(framing: &FramingMode, chunk_size: usize) -> Result<Box<dyn Indexer>> {
    Ok(match framing {
        FramingMode::SeparatorDelimited { separator } => {
            Box::new(SeparatorIndexer::new(separator.clone(), chunk_size)?)
        }
        FramingMode::LengthPrefixed { prefix_width } => {
            Box::new(LengthPrefixIndexer::new(*prefix_width)?)
        }
    })
}

/// Offset table of one trace.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceIndex {
    framing:     FramingMode,
    offsets:     Vec<u64>,
    usable_size: u64,
    truncated:   bool,
}

impl TraceIndex {
    pub(crate) fn new(framing: FramingMode, offsets: Vec<u64>, usable_size: u64, truncated: bool) -> Self {
        debug_assert!(offsets.first().map_or(true, |&o| o == 0));
        debug_assert!(offsets.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(offsets.last().map_or(true, |&o| o <= usable_size));
        Self { framing, offsets, usable_size, truncated }
    }

    /// Build an index without the invariant checks, to exercise the reader
    /// against inconsistent tables.
    #[cfg(test)]
    pub(crate) fn unchecked(framing: FramingMode, offsets: Vec<u64>, usable_size: u64) -> Self {
        Self { framing, offsets, usable_size, truncated: false }
    }

    /// Scan `stream` with the strategy for `framing`.
    pub fn build(
        stream:       &mut StreamHandle,
        framing:      &FramingMode,
        chunk_size:   usize,
        max_messages: Option<usize>,
        progress:     Option<&mut ProgressFn<'_>>,
    ) -> Result<Self> {
        let index = indexer_for(framing, chunk_size)?.build_index(stream, max_messages, progress)?;
        log::debug!(
            "indexed {}: {} message(s), {} usable bytes, {}",
            stream.label(), index.message_count(), index.usable_size, index.framing
        );
        if index.truncated {
            log::warn!(
                "{}: final frame at offset {} is incomplete",
                stream.label(),
                index.offsets.last().copied().unwrap_or(0)
            );
        }
        Ok(index)
    }

    pub fn message_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Absolute start of frame `i` (including any length prefix).
    pub fn offset_of(&self, i: usize) -> Option<u64> {
        self.offsets.get(i).copied()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// End of the last usable frame.  Less than the stream size when the
    /// scan stopped at a message cap.
    pub fn usable_size(&self) -> u64 {
        self.usable_size
    }

    /// True if the stream ended before the final frame was complete.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn framing(&self) -> &FramingMode {
        &self.framing
    }

    /// Absolute start of the frame after `i`, or the usable end for the last.
    fn frame_end(&self, i: usize) -> u64 {
        self.offsets.get(i + 1).copied().unwrap_or(self.usable_size)
    }

    /// Absolute byte range of message `i`'s payload, framing excluded.
    pub fn payload_range(&self, i: usize) -> Option<Range<u64>> {
        let start = self.offset_of(i)? + self.framing.header_len();
        let end   = self.frame_end(i);
        let last  = i + 1 == self.offsets.len();
        // A truncated final frame has no trailer to strip.
        let end = if last && self.truncated {
            end
        } else {
            end.saturating_sub(self.framing.trailer_len())
        };
        Some(start..end.max(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_ranges_strip_separators() {
        // A$$BB$$C
        let idx = TraceIndex::new(FramingMode::separator(b"$$".to_vec()), vec![0, 3, 7], 8, true);
        assert_eq!(idx.payload_range(0), Some(0..1));
        assert_eq!(idx.payload_range(1), Some(3..5));
        assert_eq!(idx.payload_range(2), Some(7..8));
        assert_eq!(idx.payload_range(3), None);
    }

    #[test]
    fn payload_ranges_skip_length_prefix() {
        // 0x01 'A' 0x02 'B' 'B'
        let idx = TraceIndex::new(FramingMode::length_prefixed(1), vec![0, 2], 5, false);
        assert_eq!(idx.payload_range(0), Some(1..2));
        assert_eq!(idx.payload_range(1), Some(3..5));
    }

    #[test]
    fn terminated_final_frame_drops_its_separator() {
        // A$$BB$$
        let idx = TraceIndex::new(FramingMode::separator(b"$$".to_vec()), vec![0, 3], 7, false);
        assert_eq!(idx.payload_range(1), Some(3..5));
    }

    #[test]
    fn empty_index_has_no_payloads() {
        let idx = TraceIndex::new(FramingMode::default(), Vec::new(), 0, false);
        assert!(idx.is_empty());
        assert_eq!(idx.payload_range(0), None);
        assert!(!TraceIndex::new(FramingMode::default(), vec![0], 3, true).is_empty());
    }
}
