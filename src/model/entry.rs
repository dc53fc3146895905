//! A single file, directory, or symlink inside an archive (section 3, 4.D).

use chrono::{DateTime, TimeZone, Utc};

use crate::crypto::EncryptionMethod;
use crate::encoding::Encoding;
use crate::error::{Error, FormatError};
use crate::parse::{ExtraField, HostSystem, Method, Mode, Version};

use super::data_source::DataSource;

/// The entry's file type: a directory, a regular file, or a symbolic link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The entry is a directory.
    Directory,
    /// The entry is a regular file.
    File,
    /// The entry is a symbolic link; its data is the link target.
    Symlink,
}

/// A single entry (file, directory, or symlink) within an [Archive](super::Archive).
pub struct Entry {
    pub(crate) name: String,
    pub(crate) created_os: HostSystem,
    pub(crate) extracted_os: HostSystem,
    pub(crate) version_made_by: u8,
    pub(crate) version_needed: u8,
    pub(crate) compression_method: Method,
    pub(crate) gpbf: u16,
    pub(crate) modified: DateTime<Utc>,
    pub(crate) created: Option<DateTime<Utc>>,
    pub(crate) accessed: Option<DateTime<Utc>>,
    pub(crate) crc32: Option<u32>,
    pub(crate) compressed_size: Option<u64>,
    pub(crate) uncompressed_size: Option<u64>,
    pub(crate) internal_attr: u16,
    pub(crate) mode: Mode,
    pub(crate) uid: Option<u32>,
    pub(crate) gid: Option<u32>,
    pub(crate) local_header_offset: u64,
    pub(crate) cd_extras: Vec<ExtraField>,
    pub(crate) local_extras: Vec<ExtraField>,
    pub(crate) comment: Option<String>,
    pub(crate) password: Option<String>,
    /// The password needed to decrypt this entry's *existing* (on-disk, for
    /// a [DataSource::Backed] entry) bytes. Distinct from [Self::password],
    /// which is the password the writer will use to (re-)encrypt this
    /// entry's output -- the two diverge whenever an already-encrypted entry
    /// gets a new write password without its old one being cleared first.
    pub(crate) read_password: Option<String>,
    pub(crate) encryption_method: EncryptionMethod,
    pub(crate) compression_level: i32,
    pub(crate) charset: Option<Encoding>,
    pub(crate) data: DataSource,
    /// Set whenever a mutation would change the on-disk bytes of a
    /// [DataSource::Backed] entry (compression method/level, password,
    /// encryption method). The writer uses this to decide between
    /// copy-through and recoding (section 4.H); irrelevant for entries whose
    /// data isn't `Backed` in the first place, since those always go through
    /// a fresh compress/encrypt pass anyway.
    pub(crate) needs_recode: bool,
}

impl Entry {
    /// Creates a fresh regular-file entry with the given name and content,
    /// defaulting to DEFLATE at the default compression level and no
    /// encryption.
    pub fn new_file(name: impl Into<String>, data: DataSource) -> Result<Self, Error> {
        let name = name.into();
        validate_name(&name, false)?;
        Ok(Self {
            name,
            created_os: HostSystem::Unix,
            extracted_os: HostSystem::Unix,
            version_made_by: 45,
            version_needed: 20,
            compression_method: Method::Deflate,
            gpbf: 0,
            modified: Utc::now(),
            created: None,
            accessed: None,
            crc32: None,
            compressed_size: None,
            uncompressed_size: None,
            internal_attr: 0,
            mode: Mode::DEFAULT_FILE,
            uid: None,
            gid: None,
            local_header_offset: 0,
            cd_extras: Vec::new(),
            local_extras: Vec::new(),
            comment: None,
            password: None,
            read_password: None,
            encryption_method: EncryptionMethod::None,
            compression_level: flate2::Compression::default().level() as i32,
            charset: None,
            data,
            needs_recode: false,
        })
    }

    /// Creates a fresh directory entry. The name is normalized to end with
    /// `/`, per APPNOTE convention.
    pub fn new_dir(name: impl Into<String>) -> Result<Self, Error> {
        let mut name = name.into();
        validate_name(&name, true)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        Ok(Self {
            name,
            created_os: HostSystem::Unix,
            extracted_os: HostSystem::Unix,
            version_made_by: 45,
            version_needed: 20,
            compression_method: Method::Store,
            gpbf: 0,
            modified: Utc::now(),
            created: None,
            accessed: None,
            crc32: Some(0),
            compressed_size: Some(0),
            uncompressed_size: Some(0),
            internal_attr: 0,
            mode: Mode::DEFAULT_DIR,
            uid: None,
            gid: None,
            local_header_offset: 0,
            cd_extras: Vec::new(),
            local_extras: Vec::new(),
            comment: None,
            password: None,
            read_password: None,
            encryption_method: EncryptionMethod::None,
            compression_level: 0,
            charset: None,
            data: DataSource::Empty,
            needs_recode: false,
        })
    }

    /// This entry's name, as a `/`-separated path relative to the archive root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames this entry. The Unicode-Path extra field (which would
    /// override the name with stale data) is dropped.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), Error> {
        let name = name.into();
        validate_name(&name, self.is_directory())?;
        self.name = name;
        self.cd_extras.retain(|ef| !matches!(ef, ExtraField::UnicodePath(_)));
        self.local_extras.retain(|ef| !matches!(ef, ExtraField::UnicodePath(_)));
        Ok(())
    }

    /// Whether this entry represents a directory.
    pub fn is_directory(&self) -> bool {
        self.mode.has(Mode::DIR) || self.name.ends_with('/')
    }

    /// Whether this entry represents a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.mode.has(Mode::SYMLINK)
    }

    /// This entry's kind: directory, file, or symlink.
    pub fn kind(&self) -> EntryKind {
        if self.is_symlink() {
            EntryKind::Symlink
        } else if self.is_directory() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    /// The Unix permission/mode bits, if known.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.created_os {
            HostSystem::Unix | HostSystem::Osx => Some(self.mode.to_unix_mode()),
            _ => None,
        }
    }

    /// The compression method used (or to be used) for this entry's data.
    pub fn compression_method(&self) -> Method {
        self.compression_method
    }

    /// Sets the compression method. `Method::Aex` can't be set directly;
    /// encryption is controlled via [Self::set_password] instead.
    pub fn set_compression_method(&mut self, method: Method) -> Result<(), Error> {
        if matches!(method, Method::Aex) {
            return Err(Error::invalid_argument(
                "Method::Aex is set implicitly when WinZip AES encryption is enabled",
            ));
        }
        self.compression_method = method;
        self.needs_recode = true;
        Ok(())
    }

    /// The DEFLATE compression level, `-1` (the default) through `9`,
    /// ignored for other methods.
    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }

    /// Sets the DEFLATE compression level (`-1` for the default, or `0`-`9`).
    /// Encoded into general purpose bit flag bits 1-2 at serialization time.
    pub fn set_compression_level(&mut self, level: i32) -> Result<(), Error> {
        if !(-1..=9).contains(&level) {
            return Err(Error::invalid_argument(format!(
                "compression level must be -1 (default) or 0-9, got {level}"
            )));
        }
        self.compression_level = level;
        self.needs_recode = true;
        Ok(())
    }

    /// Sets (or clears, with `None`) the password used to encrypt this entry.
    /// Clearing the password also disables encryption for the entry; see
    /// also [Self::disable_encryption].
    pub fn set_password(&mut self, password: Option<String>) {
        match password {
            Some(p) => {
                self.password = Some(p);
                if !self.encryption_method.is_encrypted() {
                    self.encryption_method = EncryptionMethod::WinZipAes256;
                }
            }
            None => {
                self.password = None;
                self.encryption_method = EncryptionMethod::None;
            }
        }
        self.needs_recode = true;
    }

    /// The password set for this entry, if any.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// The password used to decrypt this entry's existing, already-encrypted
    /// [DataSource::Backed] bytes -- as opposed to [Self::password], which is
    /// the password the writer will (re-)encrypt with. Needed only to
    /// [read][crate::ZipArchive::read] an encrypted entry, or to recode one
    /// whose compression/encryption settings just changed.
    pub fn read_password(&self) -> Option<&str> {
        self.read_password.as_deref()
    }

    /// Sets the password used to decrypt this entry's existing data.
    pub fn set_read_password(&mut self, password: Option<String>) {
        self.read_password = password;
    }

    /// Disables encryption for this entry, dropping its password.
    pub fn disable_encryption(&mut self) {
        self.password = None;
        self.encryption_method = EncryptionMethod::None;
        self.needs_recode = true;
    }

    /// The encryption method protecting this entry's data, if any.
    pub fn encryption_method(&self) -> EncryptionMethod {
        self.encryption_method
    }

    /// Sets the encryption method. Requires a password to already be set,
    /// unless `method` is [EncryptionMethod::None].
    pub fn set_encryption_method(&mut self, method: EncryptionMethod) -> Result<(), Error> {
        if method.is_encrypted() && self.password.is_none() {
            return Err(Error::invalid_argument(
                "a password must be set before enabling encryption",
            ));
        }
        self.encryption_method = method;
        self.needs_recode = true;
        Ok(())
    }

    /// The character encoding explicitly requested for this entry's name and
    /// comment, if any (otherwise auto-detected on read, UTF-8 on write).
    pub fn charset(&self) -> Option<Encoding> {
        self.charset
    }

    /// Explicitly sets the character encoding for this entry's name/comment.
    pub fn set_charset(&mut self, charset: Option<Encoding>) {
        self.charset = charset;
    }

    /// This entry's comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Sets this entry's comment.
    pub fn set_comment(&mut self, comment: Option<String>) -> Result<(), Error> {
        if let Some(c) = &comment {
            if c.len() > u16::MAX as usize {
                return Err(FormatError::FieldTooLong("entry comment", c.len()).into());
            }
        }
        self.comment = comment;
        Ok(())
    }

    /// Appends an extra field to both the central directory and local
    /// header's extra field lists.
    pub fn add_extra_field(&mut self, field: ExtraField) {
        self.cd_extras.push(field.clone());
        self.local_extras.push(field);
    }

    /// The uncompressed size, if known (unknown only for entries mid-write
    /// via a streaming [DataSource::Reader] before the first pass completes).
    pub fn uncompressed_size(&self) -> Option<u64> {
        self.uncompressed_size
    }

    /// The compressed size, if known.
    pub fn compressed_size(&self) -> Option<u64> {
        self.compressed_size
    }

    /// The CRC-32 of the uncompressed data, if known.
    pub fn crc32(&self) -> Option<u32> {
        self.crc32
    }

    /// Returns the best available modification time: NTFS timestamp >
    /// extended timestamp > MS-DOS timestamp (the field always carries a
    /// best-effort fallback, so this never fails).
    pub fn get_mtime(&self) -> DateTime<Utc> {
        self.modified
    }

    /// Returns the best available access time, if any extra field recorded one.
    pub fn get_atime(&self) -> Option<DateTime<Utc>> {
        self.accessed
    }

    /// Returns the best available creation time, if any extra field recorded one.
    pub fn get_ctime(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// Sets the modification time.
    pub fn set_mtime(&mut self, mtime: DateTime<Utc>) {
        self.modified = mtime;
    }

    /// The offset of this entry's local file header within the archive, as
    /// last read (or, for a fresh entry, 0 until it's written).
    pub fn local_header_offset(&self) -> u64 {
        self.local_header_offset
    }

    /// The general purpose bit flag, as last read. When writing, the
    /// relevant bits (UTF-8, data descriptor, encryption, DEFLATE level) are
    /// recomputed from the entry's current state rather than reusing this
    /// value verbatim (section 9, "gpbf is a projection, not a source of truth").
    pub fn gpbf(&self) -> u16 {
        self.gpbf
    }

    /// Central-directory extra fields, as last read (or queued to write).
    pub fn cd_extras(&self) -> &[ExtraField] {
        &self.cd_extras
    }

    /// Local-header extra fields, as last read (or queued to write).
    pub fn local_extras(&self) -> &[ExtraField] {
        &self.local_extras
    }

    pub(crate) fn data(&self) -> &DataSource {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut DataSource {
        &mut self.data
    }

    pub(crate) fn set_data(&mut self, data: DataSource) {
        self.data = data;
    }

    /// This entry's `version made by`, as a [Version] (host system + number).
    pub(crate) fn version_made_by(&self) -> Version {
        Version {
            host_system: self.created_os,
            version: self.version_made_by,
        }
    }

    /// This entry's `version needed to extract`, as a [Version].
    pub(crate) fn version_needed(&self) -> Version {
        Version {
            host_system: self.extracted_os,
            version: self.version_needed,
        }
    }

    pub(crate) fn mode_raw(&self) -> Mode {
        self.mode
    }

    pub(crate) fn internal_attr(&self) -> u16 {
        self.internal_attr
    }

    pub(crate) fn uid(&self) -> Option<u32> {
        self.uid
    }

    pub(crate) fn gid(&self) -> Option<u32> {
        self.gid
    }

    /// Whether this entry's [DataSource::Backed] bytes no longer match its
    /// current compression/encryption settings, and must be decoded and
    /// re-encoded rather than copied through verbatim.
    pub(crate) fn needs_recode(&self) -> bool {
        self.needs_recode
    }

    /// Overwrites this entry's CRC-32, as computed while writing its data.
    pub(crate) fn set_crc32(&mut self, crc32: u32) {
        self.crc32 = Some(crc32);
    }

    /// Overwrites the offset at which this entry's local header lands, as
    /// computed by the writer.
    pub(crate) fn set_local_header_offset(&mut self, offset: u64) {
        self.local_header_offset = offset;
    }

    /// Overwrites the general purpose bit flag wholesale; used by the writer,
    /// which recomputes it from semantic state at serialization time rather
    /// than trusting whatever was last read (section 9, "gpbf is a
    /// projection, not a source of truth").
    pub(crate) fn set_gpbf_raw(&mut self, gpbf: u16) {
        self.gpbf = gpbf;
    }

    /// Overwrites the compression method without going through the
    /// `Method::Aex` guard in [Self::set_compression_method]; used by the
    /// writer when switching an entry to the AE-x marker for WinZip AES.
    pub(crate) fn set_compression_method_raw(&mut self, method: Method) {
        self.compression_method = method;
    }

    /// Replaces the central-directory extra fields wholesale, as computed by
    /// the writer (Zip64 promotion, alignment filler, WinZip AES marker).
    pub(crate) fn set_cd_extras(&mut self, extras: Vec<ExtraField>) {
        self.cd_extras = extras;
    }

    /// Overwrites the encryption method without requiring a password to
    /// already be set; used by the reader, which discovers encryption from
    /// the gpbf/extra fields of an archive that's about to get a read
    /// password attached separately.
    pub(crate) fn set_encryption_method_raw(&mut self, method: EncryptionMethod) {
        self.encryption_method = method;
    }

    /// Replaces the local-header extra fields wholesale, as parsed during
    /// local header confirmation (which may see a superset of the central
    /// directory's extras, e.g. Zip64 or WinZip AES).
    pub(crate) fn set_local_extras(&mut self, extras: Vec<ExtraField>) {
        self.local_extras = extras;
    }

    /// Overwrites the (possibly Zip64-promoted) sizes once the local header
    /// has been confirmed.
    pub(crate) fn set_resolved_sizes(&mut self, uncompressed_size: u64, compressed_size: u64) {
        self.uncompressed_size = Some(uncompressed_size);
        self.compressed_size = Some(compressed_size);
    }

    /// Applies a parsed extra field's metadata onto this entry (timestamps,
    /// uid/gid, Zip64 sizes/offset). Sizes/offset overrides are applied by
    /// the caller before this runs, since Zip64 needs the raw u32 sentinels.
    pub(crate) fn apply_extra_field(&mut self, ef: &ExtraField) {
        match ef {
            ExtraField::Timestamp(ts) => {
                if let Some(mtime) = ts.mtime {
                    if let chrono::LocalResult::Single(dt) = Utc.timestamp_opt(mtime as i64, 0) {
                        self.modified = dt;
                    }
                }
                if let Some(atime) = ts.atime {
                    self.accessed = Utc.timestamp_opt(atime as i64, 0).single();
                }
                if let Some(ctime) = ts.ctime {
                    self.created = Utc.timestamp_opt(ctime as i64, 0).single();
                }
            }
            ExtraField::Ntfs(nf) => {
                for attr in &nf.attrs {
                    if let crate::parse::NtfsAttr::Attr1(attr) = attr {
                        if let Some(dt) = attr.mtime.to_datetime() {
                            self.modified = dt;
                        }
                        self.created = attr.ctime.to_datetime();
                        self.accessed = attr.atime.to_datetime();
                    }
                }
            }
            ExtraField::Unix(uf) => {
                if let chrono::LocalResult::Single(dt) = Utc.timestamp_opt(uf.mtime as i64, 0) {
                    self.modified = dt;
                }
                if self.uid.is_none() {
                    self.uid = Some(uf.uid as u32);
                }
                if self.gid.is_none() {
                    self.gid = Some(uf.gid as u32);
                }
            }
            ExtraField::NewUnix(uf) => {
                self.uid = Some(uf.uid as u32);
                self.gid = Some(uf.gid as u32);
            }
            ExtraField::AsiUnix(au) => {
                self.uid = Some(au.uid as u32);
                self.gid = Some(au.gid as u32);
            }
            ExtraField::WinZipAes(aes) => {
                if let Some(method) =
                    EncryptionMethod::from_aes_key_bits(aes.key_bits().unwrap_or(0) as u16)
                {
                    self.encryption_method = method;
                }
                self.compression_method = Method::from(aes.method);
            }
            _ => {}
        }
    }

    /// Builds an [Entry] from a parsed central directory record. Called by
    /// [crate::parse::CentralDirectoryFileHeader::as_entry]; kept here so
    /// field defaults live next to the rest of the type.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_central_directory(
        name: String,
        comment: Option<String>,
        version_made_by: Version,
        version_needed: Version,
        gpbf: u16,
        compression_method: Method,
        modified: DateTime<Utc>,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        internal_attr: u16,
        mode: Mode,
        local_header_offset: u64,
        cd_extras: Vec<ExtraField>,
    ) -> Self {
        let mut entry = Self {
            name,
            created_os: version_made_by.host_system,
            extracted_os: version_needed.host_system,
            version_made_by: version_made_by.version,
            version_needed: version_needed.version,
            compression_method,
            gpbf,
            modified,
            created: None,
            accessed: None,
            crc32: Some(crc32),
            compressed_size: Some(compressed_size),
            uncompressed_size: Some(uncompressed_size),
            internal_attr,
            mode,
            uid: None,
            gid: None,
            local_header_offset,
            cd_extras: Vec::new(),
            local_extras: Vec::new(),
            comment,
            password: None,
            read_password: None,
            encryption_method: if gpbf & 0x1 != 0 {
                EncryptionMethod::PkwareZipCrypto
            } else {
                EncryptionMethod::None
            },
            compression_level: 0,
            charset: None,
            data: DataSource::Empty,
            needs_recode: false,
        };
        for ef in &cd_extras {
            entry.apply_extra_field(ef);
        }
        entry.cd_extras = cd_extras;
        entry
    }

    pub(crate) fn set_version(&mut self, made_by: Version, needed: Version) {
        self.created_os = made_by.host_system;
        self.extracted_os = needed.host_system;
        self.version_made_by = made_by.version;
        self.version_needed = needed.version;
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if self.is_directory() {
            self.mode |= Mode::DIR;
        }
    }
}

impl Clone for Entry {
    /// Entries holding a one-shot [DataSource::Reader] can't be cloned; this
    /// is only meant for entries that were read from an archive (and so hold
    /// [DataSource::Backed]) or built from [DataSource::Bytes]/[DataSource::Path].
    fn clone(&self) -> Self {
        let data = match &self.data {
            DataSource::Empty => DataSource::Empty,
            DataSource::Bytes(b) => DataSource::Bytes(b.clone()),
            DataSource::Path(p) => DataSource::Path(p.clone()),
            DataSource::Backed {
                source,
                data_offset,
                compressed_size,
            } => DataSource::Backed {
                source: source.clone(),
                data_offset: *data_offset,
                compressed_size: *compressed_size,
            },
            DataSource::Reader(_) => DataSource::Empty,
        };
        Self {
            name: self.name.clone(),
            created_os: self.created_os,
            extracted_os: self.extracted_os,
            version_made_by: self.version_made_by,
            version_needed: self.version_needed,
            compression_method: self.compression_method,
            gpbf: self.gpbf,
            modified: self.modified,
            created: self.created,
            accessed: self.accessed,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            internal_attr: self.internal_attr,
            mode: self.mode,
            uid: self.uid,
            gid: self.gid,
            local_header_offset: self.local_header_offset,
            cd_extras: self.cd_extras.clone(),
            local_extras: self.local_extras.clone(),
            comment: self.comment.clone(),
            password: self.password.clone(),
            read_password: self.read_password.clone(),
            encryption_method: self.encryption_method,
            compression_level: self.compression_level,
            charset: self.charset,
            data,
            needs_recode: self.needs_recode,
        }
    }
}

fn validate_name(name: &str, is_dir: bool) -> Result<(), Error> {
    if name.is_empty() {
        return Err(FormatError::InvalidEntryName("name is empty".into()).into());
    }
    if name.len() > u16::MAX as usize {
        return Err(FormatError::FieldTooLong("entry name", name.len()).into());
    }
    if name.contains('\\') {
        return Err(FormatError::InvalidEntryName(
            "name must use '/' as a separator, not '\\'".into(),
        )
        .into());
    }
    if !is_dir && name.ends_with('/') {
        return Err(FormatError::InvalidEntryName(
            "file entry name must not end with '/'".into(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_file_rejects_empty_and_backslash_names() {
        assert!(Entry::new_file("", DataSource::Empty).is_err());
        assert!(Entry::new_file("a\\b.txt", DataSource::Empty).is_err());
    }

    #[test]
    fn new_file_rejects_trailing_slash() {
        assert!(Entry::new_file("looks/like/a/dir/", DataSource::Empty).is_err());
    }

    #[test]
    fn new_dir_normalizes_trailing_slash() {
        let dir = Entry::new_dir("assets").unwrap();
        assert_eq!(dir.name(), "assets/");
        assert!(dir.is_directory());

        let dir = Entry::new_dir("assets/").unwrap();
        assert_eq!(dir.name(), "assets/");
    }

    #[test]
    fn set_compression_method_rejects_aex_directly() {
        let mut entry = Entry::new_file("a.txt", DataSource::Empty).unwrap();
        assert!(entry.set_compression_method(Method::Aex).is_err());
        assert!(entry.set_compression_method(Method::Store).is_ok());
    }

    #[test]
    fn set_password_defaults_to_winzip_aes_256() {
        let mut entry = Entry::new_file("a.txt", DataSource::Empty).unwrap();
        entry.set_password(Some("hunter2".to_string()));
        assert_eq!(entry.encryption_method(), EncryptionMethod::WinZipAes256);

        entry.set_password(None);
        assert_eq!(entry.encryption_method(), EncryptionMethod::None);
        assert_eq!(entry.password(), None);
    }

    #[test]
    fn set_encryption_method_requires_a_password_first() {
        let mut entry = Entry::new_file("a.txt", DataSource::Empty).unwrap();
        assert!(entry
            .set_encryption_method(EncryptionMethod::WinZipAes128)
            .is_err());

        entry.set_password(Some("hunter2".to_string()));
        assert!(entry
            .set_encryption_method(EncryptionMethod::WinZipAes128)
            .is_ok());
        assert_eq!(entry.encryption_method(), EncryptionMethod::WinZipAes128);
    }

    #[test]
    fn set_name_drops_stale_unicode_path_extra() {
        use crate::parse::ExtraUnicodePathField;

        let mut entry = Entry::new_file("a.txt", DataSource::Empty).unwrap();
        entry.add_extra_field(ExtraField::UnicodePath(ExtraUnicodePathField {
            version: 1,
            name_crc32: 0,
            name: b"a.txt".to_vec(),
        }));
        assert_eq!(entry.cd_extras().len(), 1);

        entry.set_name("b.txt").unwrap();
        assert!(entry.cd_extras().is_empty());
    }

    #[test]
    fn rename_to_trailing_slash_is_rejected_for_a_file() {
        let mut entry = Entry::new_file("a.txt", DataSource::Empty).unwrap();
        assert!(entry.set_name("a/").is_err());
    }
}
