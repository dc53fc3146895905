//! The public facade (section 6, "in-memory call surface"): a single
//! [ZipArchive] type tying together [crate::model], [crate::reader], and
//! [crate::writer] into the `open`/mutate/`save` workflow described by the
//! specification.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use crate::crypto::EncryptionMethod;
use crate::error::Error;
use crate::model::{Archive, DataSource, Entry};
use crate::parse::Method;
use crate::pipeline::open_entry_reader;
pub use crate::reader::ReaderOptions;
use crate::reader::read_archive;
use crate::source::{BytesSource, FileSource, Source};
pub use crate::writer::WriterOptions;
use crate::writer::write_archive;

/// A ZIP archive open for reading, mutation, and (re-)writing.
///
/// Wraps an in-memory [Archive] model together with the byte source it was
/// opened from, if any. An archive created via [Self::new] has no backing
/// source, so [Self::unchange_entry] and friends are no-ops on it, and every
/// entry is written fresh (never copy-through) on save. An archive produced
/// by [Self::open] (or one of its variants) keeps its source alive for as
/// long as any entry holds a [DataSource::Backed] reference into it --
/// copy-through entries borrow from it directly rather than buffering their
/// bytes, so the source must outlive this archive (section 9,
/// "back-references into the source archive").
pub struct ZipArchive {
    archive: Archive,
    // Never read directly; kept alive so every `DataSource::Backed` entry's
    // `Arc<dyn Source>` clone stays valid for the archive's lifetime.
    #[allow(dead_code)]
    source: Option<Arc<dyn Source>>,
    default_read_password: Option<String>,
}

impl Default for ZipArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchive {
    /// Creates a fresh, empty archive with no backing source.
    pub fn new() -> Self {
        Self {
            archive: Archive::new(),
            source: None,
            default_read_password: None,
        }
    }

    /// Opens an existing archive from any random-access byte [Source], using
    /// default [ReaderOptions].
    pub fn open(source: Arc<dyn Source>) -> Result<Self, Error> {
        Self::open_with_options(source, &ReaderOptions::default())
    }

    /// Opens an existing archive, overriding how its entry names/comments
    /// are decoded.
    pub fn open_with_options(source: Arc<dyn Source>, options: &ReaderOptions) -> Result<Self, Error> {
        let archive = read_archive(source.clone(), options)?;
        Ok(Self {
            archive,
            source: Some(source),
            default_read_password: None,
        })
    }

    /// Opens an archive whose bytes are already in memory.
    pub fn open_from_bytes(bytes: Vec<u8>) -> Result<Self, Error> {
        Self::open(Arc::new(BytesSource::new(bytes)))
    }

    /// Opens an archive from a file on disk.
    pub fn open_from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open(Arc::new(FileSource::open(path.as_ref())?))
    }

    /// Adds (or replaces, if `name` already exists) a regular file entry
    /// holding `data` in memory, compressed with `method` (defaulting to
    /// DEFLATE if `None`).
    pub fn add(
        &mut self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
        method: Option<Method>,
    ) -> Result<(), Error> {
        let mut entry = Entry::new_file(name, DataSource::Bytes(data.into()))?;
        if let Some(method) = method {
            entry.set_compression_method(method)?;
        }
        self.archive.insert(entry);
        Ok(())
    }

    /// Adds (or replaces) a regular file entry whose content is read from
    /// `path` lazily, at save time. `name` defaults to `path`'s file name.
    pub fn add_file(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<String>,
        method: Option<Method>,
    ) -> Result<(), Error> {
        let path = path.as_ref();
        let name = name
            .or_else(|| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .ok_or_else(|| Error::invalid_argument("no entry name given and path has none"))?;
        let mut entry = Entry::new_file(name, DataSource::Path(path.to_path_buf()))?;
        if let Ok(meta) = std::fs::metadata(path) {
            if let Ok(modified) = meta.modified() {
                entry.set_mtime(modified.into());
            }
        }
        if let Some(method) = method {
            entry.set_compression_method(method)?;
        }
        self.archive.insert(entry);
        Ok(())
    }

    /// Adds (or replaces) a regular file entry whose content is read, once,
    /// from an arbitrary byte stream at save time.
    pub fn add_stream(
        &mut self,
        reader: impl Read + Send + 'static,
        name: impl Into<String>,
        method: Option<Method>,
    ) -> Result<(), Error> {
        let mut entry = Entry::new_file(name, DataSource::Reader(Box::new(reader)))?;
        if let Some(method) = method {
            entry.set_compression_method(method)?;
        }
        self.archive.insert(entry);
        Ok(())
    }

    /// Adds (or replaces) a directory entry. `name` is normalized to end
    /// with `/` if it doesn't already.
    pub fn add_dir(&mut self, name: impl Into<String>) -> Result<(), Error> {
        self.archive.insert(Entry::new_dir(name)?);
        Ok(())
    }

    /// Renames an entry in place. See [Archive::rename].
    pub fn rename(&mut self, old_name: &str, new_name: impl Into<String>) -> Result<(), Error> {
        self.archive.rename(old_name, new_name)
    }

    /// Removes an entry by exact name, returning it.
    pub fn delete(&mut self, name: &str) -> Result<Entry, Error> {
        self.archive.delete(name)
    }

    /// Removes every entry whose name matches a glob pattern. Never fails
    /// on zero matches.
    pub fn delete_by_glob(&mut self, pattern: &str) -> Result<usize, Error> {
        self.archive.delete_by_glob(pattern)
    }

    /// Removes every entry whose name matches a regular expression. Never
    /// fails on zero matches.
    pub fn delete_by_regex(&mut self, pattern: &str) -> Result<usize, Error> {
        self.archive.delete_by_regex(pattern)
    }

    /// Sets (or, with `None`, clears) the write password for every entry in
    /// the archive. `method` picks the encryption scheme when setting a
    /// password (defaulting to WinZip AES-256); ignored when clearing.
    pub fn set_password(&mut self, password: Option<String>, method: Option<EncryptionMethod>) {
        for entry in self.archive.entries_mut() {
            set_entry_password(entry, password.clone(), method);
        }
    }

    /// Sets (or clears) the write password for a single entry.
    pub fn set_password_for(
        &mut self,
        name: &str,
        password: Option<String>,
        method: Option<EncryptionMethod>,
    ) -> Result<(), Error> {
        let entry = self.entry_mut(name)?;
        set_entry_password(entry, password, method);
        Ok(())
    }

    /// Disables encryption (and drops the password) for every entry.
    pub fn disable_encryption(&mut self) {
        for entry in self.archive.entries_mut() {
            entry.disable_encryption();
        }
    }

    /// Disables encryption for a single entry.
    pub fn disable_encryption_for(&mut self, name: &str) -> Result<(), Error> {
        self.entry_mut(name)?.disable_encryption();
        Ok(())
    }

    /// Sets the DEFLATE compression level for every entry.
    pub fn set_compression_level(&mut self, level: i32) -> Result<(), Error> {
        for entry in self.archive.entries_mut() {
            entry.set_compression_level(level)?;
        }
        Ok(())
    }

    /// Sets the DEFLATE compression level for a single entry.
    pub fn set_compression_level_for(&mut self, name: &str, level: i32) -> Result<(), Error> {
        self.entry_mut(name)?.set_compression_level(level)
    }

    /// Sets the compression method for a single entry.
    pub fn set_compression_method_for(&mut self, name: &str, method: Method) -> Result<(), Error> {
        self.entry_mut(name)?.set_compression_method(method)
    }

    /// Sets (or clears) the archive-level comment.
    pub fn set_comment(&mut self, comment: Option<String>) -> Result<(), Error> {
        self.archive.set_comment(comment)
    }

    /// Sets (or clears) a single entry's comment.
    pub fn set_comment_for(&mut self, name: &str, comment: Option<String>) -> Result<(), Error> {
        self.entry_mut(name)?.set_comment(comment)
    }

    /// Sets the alignment, in bytes, applied to STORED entries on write (0
    /// disables it).
    pub fn set_alignment(&mut self, alignment: u32) {
        self.archive.set_alignment(alignment)
    }

    /// Discards every pending mutation, restoring the archive (entries and
    /// comment) to the state it was in right after [Self::open]. No-op on an
    /// archive created via [Self::new].
    pub fn unchange_all(&mut self) {
        self.archive.unchange_all()
    }

    /// Discards pending mutations on a single entry.
    pub fn unchange_entry(&mut self, name: &str) {
        self.archive.unchange_entry(name)
    }

    /// Discards a pending change to the archive comment.
    pub fn unchange_archive_comment(&mut self) {
        self.archive.unchange_archive_comment()
    }

    /// Iterates over every entry, in archive (central directory emission)
    /// order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.archive.entries()
    }

    /// Whether an entry with this exact name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.archive.contains(name)
    }

    /// Looks up an entry's metadata by exact name.
    pub fn entry_info(&self, name: &str) -> Option<&Entry> {
        self.archive.by_name(name)
    }

    /// The archive-level comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.archive.comment()
    }

    /// The number of entries in the archive.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Whether the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Sets a fallback password used to decrypt any entry that doesn't
    /// already carry its own [Entry::read_password] -- typically set once,
    /// right after [Self::open], rather than per entry.
    pub fn set_read_password(&mut self, password: Option<String>) {
        self.default_read_password = password;
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut Entry, Error> {
        self.archive
            .by_name_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn read_password_for(&self, entry: &Entry) -> Option<String> {
        entry
            .read_password()
            .map(String::from)
            .or_else(|| self.default_read_password.clone())
    }

    /// Opens a streaming, decrypted and decompressed reader over an entry's
    /// content, verifying its CRC-32 (or WinZip AES authentication tag) as
    /// the stream is exhausted.
    ///
    /// Works for entries read from an existing archive ([DataSource::Backed])
    /// as well as entries freshly added via [Self::add]/[Self::add_file]
    /// (whose content hasn't been compressed/encrypted yet, so it's read
    /// back verbatim). Fails on an entry added via [Self::add_stream] whose
    /// one-shot reader has already been consumed (by a previous call to this
    /// method, or by a prior [Self::save_to_bytes]/[Self::save_to_path]).
    pub fn open_entry(&self, name: &str) -> Result<Box<dyn Read + '_>, Error> {
        let entry = self
            .archive
            .by_name(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.open_entry_ref(entry)
    }

    fn open_entry_ref<'a>(&self, entry: &'a Entry) -> Result<Box<dyn Read + 'a>, Error> {
        match entry.data() {
            DataSource::Backed { .. } => {
                let password = self.read_password_for(entry);
                Ok(Box::new(open_entry_reader(entry, password.as_deref())?))
            }
            _ => Ok(entry.data().open()?),
        }
    }

    /// Reads an entry's full content into memory. See [Self::open_entry] for
    /// the streaming equivalent and its caveats.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.open_entry(name)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Extracts entries to `dir`, preserving their relative paths. Extracts
    /// every entry if `names` is `None`, otherwise only the named ones
    /// (failing with [Error::NotFound] if any of them don't exist).
    pub fn extract_to(&self, dir: impl AsRef<Path>, names: Option<&[&str]>) -> Result<(), Error> {
        let dir = dir.as_ref();
        let selected: Vec<&Entry> = match names {
            Some(names) => names
                .iter()
                .map(|&n| {
                    self.archive
                        .by_name(n)
                        .ok_or_else(|| Error::NotFound(n.to_string()))
                })
                .collect::<Result<_, _>>()?,
            None => self.archive.entries().collect(),
        };

        for entry in selected {
            let out_path = dir.join(entry.name());
            if entry.is_directory() {
                std::fs::create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut reader = self.open_entry_ref(entry)?;
            let mut file = File::create(&out_path)?;
            io::copy(&mut *reader, &mut file)?;
        }
        Ok(())
    }

    /// Serializes the archive to an arbitrary sink, using default
    /// [WriterOptions].
    pub fn save_to_stream<W: Write>(&mut self, sink: W) -> Result<(), Error> {
        self.save_to_stream_with_options(sink, &WriterOptions::default())
    }

    /// Serializes the archive to an arbitrary sink.
    pub fn save_to_stream_with_options<W: Write>(
        &mut self,
        sink: W,
        options: &WriterOptions,
    ) -> Result<(), Error> {
        write_archive(&mut self.archive, sink, options)
    }

    /// Serializes the archive to a fresh, in-memory byte buffer.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        self.save_to_stream(&mut buf)?;
        Ok(buf)
    }

    /// Serializes the archive to a file on disk, creating or truncating it.
    pub fn save_to_path(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path.as_ref())?;
        self.save_to_stream(io::BufWriter::new(file))
    }

    /// Writes the archive out, then re-opens the bytes it just wrote as the
    /// new backing source (section 4.I): subsequent edits start from, and
    /// [Self::unchange_entry]/[Self::unchange_all] revert to, this last-saved
    /// state rather than whatever was originally opened.
    pub fn rewrite(&mut self) -> Result<(), Error> {
        let bytes = self.save_to_bytes()?;
        let source: Arc<dyn Source> = Arc::new(BytesSource::new(bytes));
        let archive = read_archive(source.clone(), &ReaderOptions::default())?;
        self.archive = archive;
        self.source = Some(source);
        Ok(())
    }
}

fn set_entry_password(entry: &mut Entry, password: Option<String>, method: Option<EncryptionMethod>) {
    let enabling = password.is_some();
    entry.set_password(password);
    if enabling {
        if let Some(method) = method {
            // set_password already turned encryption on (defaulting to
            // WinZip AES-256); only override the method if one was given.
            let _ = entry.set_encryption_method(method);
        }
    }
}
