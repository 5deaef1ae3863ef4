//! Seekable byte sources for trace files.
//!
//! [`StreamHandle::open`] inspects the locator's suffix:
//!
//! | Suffix | Source |
//! |--------|--------|
//! | `.xz`, `.lzma` | compressed, inflated with `lzma-rs` |
//! | anything else | raw file |
//!
//! For compressed traces the container is taken from the data: an xz magic
//! selects the xz decoder, anything else the legacy LZMA decoder.
//!
//! Compressed traces are inflated once into an anonymous temporary file, so
//! every handle is seekable and reports its decompressed size without holding
//! the trace in memory.
//!
//! A handle exclusively owns its read cursor.  After [`StreamHandle::close`]
//! every operation fails with [`TraceError::ClosedStream`].

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, TraceError};

/// Anything the engine can index: a readable, seekable byte stream.
pub trait ByteSource: Read + Seek + Send {}
impl<T: Read + Seek + Send> ByteSource for T {}

/// Decompression scheme selected from the locator suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Xz,
    Lzma,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xz"   => Compression::Xz,
            "lzma" => Compression::Lzma,
            _      => Compression::None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Xz   => "xz",
            Compression::Lzma => "lzma",
        }
    }
}

pub struct StreamHandle {
    inner:       Option<Box<dyn ByteSource>>,
    compression: Compression,
    label:       String,
}

impl StreamHandle {
    /// Open `path`, transparently inflating it when the suffix names a
    /// compression scheme.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let compression = Compression::from_path(path);
        let file = File::open(path).map_err(|e| TraceError::from_open(e, path))?;

        let inner: Box<dyn ByteSource> = match compression {
            Compression::None => Box::new(file),
            scheme            => Box::new(inflate(file, scheme)?),
        };

        let mut handle = Self {
            inner: Some(inner),
            compression,
            label: path.display().to_string(),
        };
        let size = handle.size()?;
        log::debug!("opened {} (compression: {}, {} bytes)", handle.label, compression.name(), size);
        Ok(handle)
    }

    /// Wrap an already-open source, e.g. an in-memory `Cursor`.
    pub fn from_reader<R: ByteSource + 'static>(reader: R, label: impl Into<String>) -> Self {
        Self {
            inner:       Some(Box::new(reader)),
            compression: Compression::None,
            label:       label.into(),
        }
    }

    fn source(&mut self) -> Result<&mut Box<dyn ByteSource>> {
        self.inner.as_mut().ok_or(TraceError::ClosedStream)
    }

    /// Total (decompressed) length, found by seeking to the end and back.
    pub fn size(&mut self) -> Result<u64> {
        let src  = self.source()?;
        let pos  = src.stream_position()?;
        let size = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(pos))?;
        Ok(size)
    }

    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.source()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.source()?.stream_position()?)
    }

    /// Read up to `max_bytes`.  Fewer bytes come back only at end of stream.
    pub fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>> {
        let src  = self.source()?;
        let pos  = src.stream_position()?;
        let end  = src.seek(SeekFrom::End(0))?;
        src.seek(SeekFrom::Start(pos))?;
        let want = end.saturating_sub(pos).min(max_bytes as u64);

        let mut buf = Vec::with_capacity(want as usize);
        src.take(want).read_to_end(&mut buf)?;
        Ok(buf)
    }

    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            log::debug!("closed {}", self.label);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("label", &self.label)
            .field("compression", &self.compression)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Leading bytes of every xz stream.
const XZ_MAGIC: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];

/// Container actually found in `input`.  Encoders commonly write xz under
/// a `.lzma` name, so the suffix only says that the data is compressed.
fn sniff<R: BufRead>(input: &mut R) -> io::Result<Compression> {
    let head = input.fill_buf()?;
    Ok(if head.starts_with(XZ_MAGIC) { Compression::Xz } else { Compression::Lzma })
}

/// Inflate `file` into an anonymous temporary file and rewind it.
fn inflate(file: File, scheme: Compression) -> Result<File> {
    let mut input = BufReader::new(file);
    let container = sniff(&mut input)?;
    if container != scheme {
        log::debug!("{} suffix holds a {} container", scheme.name(), container.name());
    }
    let mut spool = tempfile::tempfile()?;
    {
        let mut out = BufWriter::new(&mut spool);
        let inflated = match container {
            Compression::Xz => lzma_rs::xz_decompress(&mut input, &mut out),
            _               => lzma_rs::lzma_decompress(&mut input, &mut out),
        };
        inflated.map_err(|e| TraceError::Decompression(e.to_string()))?;
        out.flush()?;
    }
    spool.seek(SeekFrom::Start(0))?;
    Ok(spool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn compression_is_chosen_by_suffix() {
        assert_eq!(Compression::from_path(Path::new("run.osi.xz")), Compression::Xz);
        assert_eq!(Compression::from_path(Path::new("RUN.LZMA")),   Compression::Lzma);
        assert_eq!(Compression::from_path(Path::new("run.osi")),    Compression::None);
        assert_eq!(Compression::from_path(Path::new("run")),        Compression::None);
    }

    #[test]
    fn size_preserves_cursor() {
        let mut h = StreamHandle::from_reader(Cursor::new(b"0123456789".to_vec()), "mem");
        h.seek(3).unwrap();
        assert_eq!(h.size().unwrap(), 10);
        assert_eq!(h.position().unwrap(), 3);
        assert_eq!(h.read(4).unwrap(), b"3456");
    }

    #[test]
    fn short_read_only_at_end() {
        let mut h = StreamHandle::from_reader(Cursor::new(b"abc".to_vec()), "mem");
        assert_eq!(h.read(2).unwrap(), b"ab");
        assert_eq!(h.read(2).unwrap(), b"c");
        assert!(h.read(2).unwrap().is_empty());
    }

    #[test]
    fn oversized_read_is_bounded_by_stream() {
        let mut h = StreamHandle::from_reader(Cursor::new(b"abc".to_vec()), "mem");
        h.seek(1).unwrap();
        assert_eq!(h.read(usize::MAX).unwrap(), b"bc");
    }

    #[test]
    fn container_is_sniffed_from_data() {
        let mut xz = Vec::new();
        lzma_rs::xz_compress(&mut &b"payload"[..], &mut xz).unwrap();
        let mut legacy = Vec::new();
        lzma_rs::lzma_compress(&mut &b"payload"[..], &mut legacy).unwrap();

        assert_eq!(sniff(&mut &xz[..]).unwrap(), Compression::Xz);
        assert_eq!(sniff(&mut &legacy[..]).unwrap(), Compression::Lzma);
        assert_eq!(sniff(&mut &b""[..]).unwrap(), Compression::Lzma);
    }

    #[test]
    fn closed_handle_rejects_use() {
        let mut h = StreamHandle::from_reader(Cursor::new(Vec::new()), "mem");
        h.close();
        assert!(h.is_closed());
        assert!(matches!(h.size(), Err(TraceError::ClosedStream)));
        assert!(matches!(h.read(1), Err(TraceError::ClosedStream)));
    }
}
