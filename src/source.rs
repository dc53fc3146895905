//! Random-access byte sources backing an opened archive.
//!
//! The reader requires a seekable byte source of known length (section 4.F).
//! Using [positioned_io::ReadAt] instead of `Read + Seek` lets multiple
//! entries (and multiple archives, in the back-reference case described in
//! section 9) read from the same source concurrently without fighting over a
//! shared cursor.

use std::fs::File;
use std::io;
use std::path::Path;

use positioned_io::{RandomAccessFile, ReadAt};

/// A random-access, fixed-length byte source.
pub trait Source: ReadAt + Send + Sync {
    /// Total length of the source, in bytes.
    fn len(&self) -> u64;

    /// Read exactly `buf.len()` bytes starting at `pos`.
    fn read_exact_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<()> {
        ReadAt::read_exact_at(self, pos, buf)
    }
}

/// An in-memory byte source, e.g. from [crate::ZipArchive::open_from_bytes].
#[derive(Debug)]
pub struct BytesSource {
    data: Vec<u8>,
}

impl BytesSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ReadAt for BytesSource {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.data.as_slice().read_at(pos, buf)
    }
}

impl Source for BytesSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A file-backed byte source, e.g. from [crate::ZipArchive::open_from_path].
pub struct FileSource {
    file: RandomAccessFile,
    len: u64,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: RandomAccessFile::try_new(file)?,
            len,
        })
    }
}

impl ReadAt for FileSource {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read_at(pos, buf)
    }
}

impl Source for FileSource {
    fn len(&self) -> u64 {
        self.len
    }
}
