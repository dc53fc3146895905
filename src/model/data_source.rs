//! The polymorphic payload an [Entry](super::Entry) carries before it's
//! written out (section 9, "polymorphic data source").

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::source::Source;

/// Where an entry's uncompressed bytes come from.
///
/// An entry freshly added to an archive typically holds [DataSource::Bytes],
/// [DataSource::Path] or [DataSource::Reader]; an entry that was read from an
/// existing archive and left unchanged holds [DataSource::Backed], a
/// reference back into the archive's own byte source so it can be copied
/// through verbatim on rewrite without recompressing.
pub enum DataSource {
    /// A directory entry, or any entry with no content.
    Empty,

    /// Content held entirely in memory.
    Bytes(Vec<u8>),

    /// Content to be read from a file at write time.
    Path(PathBuf),

    /// Content from an arbitrary, single-use reader.
    ///
    /// Because the inner reader can't be cloned, an entry in this state can't
    /// survive [crate::ZipArchive::unchange_entry] after it's been consumed.
    Reader(Box<dyn Read + Send>),

    /// Content already sitting, compressed, inside an archive this crate
    /// opened -- used to copy entries through unchanged on rewrite.
    Backed {
        /// The archive's own byte source.
        source: Arc<dyn Source>,
        /// Offset of the first byte of (still compressed) entry data.
        data_offset: u64,
        /// Length, in bytes, of the (still compressed) entry data.
        compressed_size: u64,
    },
}

impl DataSource {
    /// A human-readable tag for this source's kind, used in `Debug` output.
    fn kind(&self) -> &'static str {
        match self {
            DataSource::Empty => "Empty",
            DataSource::Bytes(_) => "Bytes",
            DataSource::Path(_) => "Path",
            DataSource::Reader(_) => "Reader",
            DataSource::Backed { .. } => "Backed",
        }
    }

    /// Opens the raw (uncompressed, for [DataSource::Bytes]/[DataSource::Path];
    /// still-compressed for [DataSource::Backed]) bytes for reading.
    ///
    /// [DataSource::Reader] can't be opened this way since it's single-use;
    /// callers that might be writing it out (the writer, via
    /// [Self::take_reader]) must check for that variant first.
    pub(crate) fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match self {
            DataSource::Empty => Ok(Box::new(io::empty())),
            DataSource::Bytes(b) => Ok(Box::new(io::Cursor::new(b))),
            DataSource::Path(p) => Ok(Box::new(std::fs::File::open(p)?)),
            DataSource::Reader(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "DataSource::Reader must be consumed via take_reader, not open",
            )),
            DataSource::Backed {
                source,
                data_offset,
                compressed_size,
            } => Ok(Box::new(BackedReader {
                source: source.clone(),
                pos: *data_offset,
                end: data_offset + compressed_size,
            })),
        }
    }

    /// Takes ownership of a plaintext [Read] stream for this source, for the
    /// writer (section 4.H) to consume while encoding an entry. Unlike
    /// [Self::open], this works for every variant including
    /// [DataSource::Reader], whose one-shot reader is moved out and replaced
    /// with [DataSource::Empty] so a second call returns an empty stream
    /// rather than erroring.
    ///
    /// Not meant for [DataSource::Backed]: its bytes are still compressed and
    /// go through the copy-through path or [crate::pipeline::open_entry_reader]
    /// instead.
    pub(crate) fn take_reader(&mut self) -> Box<dyn Read + Send> {
        match std::mem::replace(self, DataSource::Empty) {
            DataSource::Empty => Box::new(io::empty()),
            DataSource::Bytes(b) => Box::new(io::Cursor::new(b)),
            DataSource::Path(p) => match std::fs::File::open(&p) {
                Ok(f) => Box::new(f),
                Err(e) => Box::new(ErrReader(Some(e))),
            },
            DataSource::Reader(r) => r,
            backed @ DataSource::Backed { .. } => {
                // Shouldn't be reached by the writer (copy-through/recode
                // dispatch handles Backed separately), but don't panic.
                *self = backed;
                Box::new(io::empty())
            }
        }
    }
}

/// Yields a single I/O error on the first read, then EOF; used by
/// [DataSource::take_reader] to surface a deferred file-open failure without
/// changing that method's infallible signature.
struct ErrReader(Option<io::Error>);

impl Read for ErrReader {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        match self.0.take() {
            Some(e) => Err(e),
            None => Ok(0),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataSource::{}", self.kind())
    }
}

struct BackedReader {
    source: Arc<dyn Source>,
    pos: u64,
    end: u64,
}

impl Read for BackedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = self.source.read_at(self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}
