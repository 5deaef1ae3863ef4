//! Frame writer: appends messages to a trace in either framing convention.
//!
//! The engine only reads traces; this writer is how new frames get appended
//! to them.  It refuses payloads that would not read back intact:
//!
//! - separator mode: the first separator in `payload ‖ separator` must be the
//!   trailing one, otherwise the reader would end the frame early.  An empty
//!   payload cannot open an empty trace, since a lone separator frames nothing;
//! - length-prefixed mode: the payload length must fit `prefix_width` bytes.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::codec::PayloadCodec;
use crate::error::{Result, TraceError};
use crate::framing::{find, FramingMode, MAX_PREFIX_WIDTH};

pub struct TraceWriter<W: Write> {
    writer:         W,
    framing:        FramingMode,
    /// Bytes already in the target before this writer appended anything.
    existing_bytes: u64,
    frames_written: u64,
    bytes_written:  u64,
}

impl TraceWriter<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn append_to<P: AsRef<Path>>(path: P, framing: FramingMode) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TraceError::from_open(e, path))?;
        let existing_bytes = file.metadata()?.len();
        let mut writer = Self::new(BufWriter::new(file), framing)?;
        writer.existing_bytes = existing_bytes;
        Ok(writer)
    }
}

impl<W: Write> TraceWriter<W> {
    /// Wrap `writer`, which is taken to be at the start of an empty trace.
    pub fn new(writer: W, framing: FramingMode) -> Result<Self> {
        framing.validate()?;
        Ok(Self { writer, framing, existing_bytes: 0, frames_written: 0, bytes_written: 0 })
    }

    /// Append one frame holding `payload`.
    pub fn append(&mut self, payload: &[u8]) -> Result<()> {
        match &self.framing {
            FramingMode::SeparatorDelimited { separator } => {
                if payload.is_empty() && self.existing_bytes + self.bytes_written == 0 {
                    return Err(TraceError::EmptyFirstFrame);
                }
                let mut frame = Vec::with_capacity(payload.len() + separator.len());
                frame.extend_from_slice(payload);
                frame.extend_from_slice(separator);
                if find(&frame, separator) != Some(payload.len()) {
                    return Err(TraceError::SeparatorInPayload { frame: self.frames_written });
                }
                self.writer.write_all(&frame)?;
                self.bytes_written += frame.len() as u64;
            }
            FramingMode::LengthPrefixed { prefix_width } => {
                let width = *prefix_width;
                let len   = payload.len() as u64;
                let fits  = width >= MAX_PREFIX_WIDTH || len >> (8 * width) == 0;
                if !fits {
                    return Err(TraceError::PayloadTooLarge { len, prefix_width: width });
                }
                self.writer.write_uint::<LittleEndian>(len, width)?;
                self.writer.write_all(payload)?;
                self.bytes_written += width as u64 + len;
            }
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Encode `message` with `codec` and append it.
    pub fn append_message<M>(&mut self, codec: &dyn PayloadCodec<M>, message: &M) -> Result<()> {
        let payload = codec.encode(message)?;
        self.append(&payload)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn framing(&self) -> &FramingMode {
        &self.framing
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
