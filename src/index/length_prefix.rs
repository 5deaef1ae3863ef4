//! Length-prefix walk: frames describe their own size.
//!
//! At offset `p` the walk reads exactly `prefix_width` bytes, decodes them
//! as an unsigned little-endian length `L`, records `p`, and jumps to
//! `p + prefix_width + L`.  Only the prefixes are read: one seek and one
//! small read per frame.
//!
//! A prefix cut short by end of stream is [`TraceError::CorruptFraming`];
//! unlike separator framing there is nothing to disambiguate.  A complete
//! prefix whose payload runs past end of stream marks the index truncated.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, TraceError};
use crate::framing::{FramingMode, MAX_PREFIX_WIDTH};
use crate::index::{Indexer, ProgressFn, TraceIndex};
use crate::source::StreamHandle;

pub struct LengthPrefixIndexer {
    prefix_width: usize,
}

impl LengthPrefixIndexer {
    pub fn new(prefix_width: usize) -> Result<Self> {
        FramingMode::length_prefixed(prefix_width).validate()?;
        Ok(Self { prefix_width })
    }
}

/// Decode a little-endian length of `prefix.len()` bytes.
pub(crate) fn decode_len(prefix: &[u8]) -> std::io::Result<u64> {
    debug_assert!((1..=MAX_PREFIX_WIDTH).contains(&prefix.len()));
    let mut cur = prefix;
    cur.read_uint::<LittleEndian>(prefix.len())
}

impl Indexer for LengthPrefixIndexer {
    fn framing(&self) -> FramingMode {
        FramingMode::length_prefixed(self.prefix_width)
    }

    fn build_index(
        &self,
        stream:       &mut StreamHandle,
        max_messages: Option<usize>,
        mut progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<TraceIndex> {
        let size  = stream.size()?;
        let width = self.prefix_width as u64;
        let cap   = max_messages.unwrap_or(usize::MAX);

        let mut offsets: Vec<u64> = Vec::new();
        let mut pos       = 0u64;
        let mut truncated = false;

        while pos < size && offsets.len() < cap {
            stream.seek(pos)?;
            let prefix = stream.read(self.prefix_width)?;
            if prefix.len() < self.prefix_width {
                return Err(TraceError::CorruptFraming {
                    offset:    pos,
                    expected:  self.prefix_width,
                    available: prefix.len(),
                });
            }
            let len = decode_len(&prefix)?;
            offsets.push(pos);

            let next = pos.saturating_add(width).saturating_add(len);
            if next > size {
                log::debug!(
                    "frame at {pos} declares {len} payload bytes, only {} remain",
                    size - pos - width
                );
                truncated = true;
                pos       = size;
            } else {
                pos = next;
            }

            if let Some(ref mut cb) = progress {
                cb(pos, size);
            }
        }

        stream.seek(pos)?;
        Ok(TraceIndex::new(self.framing(), offsets, pos, truncated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn index(data: &[u8], width: usize, cap: Option<usize>) -> Result<TraceIndex> {
        let mut stream = StreamHandle::from_reader(Cursor::new(data.to_vec()), "mem");
        LengthPrefixIndexer::new(width)?.build_index(&mut stream, cap, None)
    }

    #[test]
    fn decodes_little_endian() {
        assert_eq!(decode_len(&[0x02]).unwrap(), 2);
        assert_eq!(decode_len(&[0x01, 0x02, 0x00, 0x00]).unwrap(), 0x0201);
        assert_eq!(decode_len(&[0xff; 8]).unwrap(), u64::MAX);
    }

    #[test]
    fn reference_example() {
        let idx = index(&[0x01, b'A', 0x02, b'B', b'B'], 1, None).unwrap();
        assert_eq!(idx.offsets(), &[0, 2]);
        assert_eq!(idx.usable_size(), 5);
        assert!(!idx.is_truncated());
    }

    #[test]
    fn short_prefix_is_corrupt() {
        let data = [0x01, 0x00, 0x00, 0x00, b'A', 0x05, 0x00];
        match index(&data, 4, None) {
            Err(TraceError::CorruptFraming { offset, expected, available }) => {
                assert_eq!((offset, expected, available), (5, 4, 2));
            }
            other => panic!("expected CorruptFraming, got {other:?}"),
        }
    }

    #[test]
    fn short_payload_is_truncated() {
        let idx = index(&[0x01, b'A', 0x09, b'B', b'B'], 1, None).unwrap();
        assert_eq!(idx.offsets(), &[0, 2]);
        assert!(idx.is_truncated());
        assert_eq!(idx.payload_range(1), Some(3..5));
    }

    #[test]
    fn cap_leaves_usable_end_at_next_frame() {
        let idx = index(&[0x01, b'A', 0x02, b'B', b'B', 0x00], 1, Some(1)).unwrap();
        assert_eq!(idx.offsets(), &[0]);
        assert_eq!(idx.usable_size(), 2);
    }

    #[test]
    fn zero_length_frames_are_messages() {
        let idx = index(&[0x00, 0x00, 0x01, b'Z'], 1, None).unwrap();
        assert_eq!(idx.offsets(), &[0, 1, 2]);
        assert_eq!(idx.payload_range(1), Some(2..2));
    }
}
