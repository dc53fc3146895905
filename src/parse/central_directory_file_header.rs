use tracing::trace;
use winnow::{
    binary::{le_u16, le_u32},
    prelude::PResult,
    token::{tag, take},
    Parser, Partial,
};

use crate::{
    encoding::{detect_utf8, Encoding},
    error::Error,
    model::Entry,
    parse::{
        ExtraField, ExtraFieldSettings, HostSystem, Method, Mode, MsdosMode, MsdosTimestamp,
        UnixMode, Version,
    },
};

/// 4.3.12 Central directory structure: File header
pub struct CentralDirectoryFileHeader {
    /// version made by
    pub creator_version: Version,

    /// version needed to extract
    pub reader_version: Version,

    /// general purpose bit flag
    pub flags: u16,

    /// compression method
    pub method: Method,

    /// last mod file datetime
    pub modified: MsdosTimestamp,

    /// crc32 hash
    pub crc32: u32,

    /// compressed size
    pub compressed_size: u32,

    /// uncompressed size
    pub uncompressed_size: u32,

    /// disk number start
    pub disk_nbr_start: u16,

    /// internal file attributes
    pub internal_attrs: u16,

    /// external file attributes
    pub external_attrs: u32,

    /// relative offset of local header
    pub header_offset: u32,

    /// name field, as raw bytes (encoding is only known once we've scanned
    /// every entry and detected a charset, or the caller overrides it)
    pub name: Vec<u8>,

    /// extra field, as raw bytes
    pub extra: Vec<u8>,

    /// comment field, as raw bytes
    pub comment: Vec<u8>,
}

impl CentralDirectoryFileHeader {
    const SIGNATURE: &'static str = "PK\x01\x02";

    /// Parser for the central directory file header
    pub fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        _ = tag(Self::SIGNATURE).parse_next(i)?;
        let creator_version = Version::parser.parse_next(i)?;
        let reader_version = Version::parser.parse_next(i)?;
        let flags = le_u16.parse_next(i)?;
        let method = Method::parser.parse_next(i)?;
        let modified = MsdosTimestamp::parser.parse_next(i)?;
        let crc32 = le_u32.parse_next(i)?;
        let compressed_size = le_u32.parse_next(i)?;
        let uncompressed_size = le_u32.parse_next(i)?;
        let name_len = le_u16.parse_next(i)?;
        let extra_len = le_u16.parse_next(i)?;
        let comment_len = le_u16.parse_next(i)?;
        let disk_nbr_start = le_u16.parse_next(i)?;
        let internal_attrs = le_u16.parse_next(i)?;
        let external_attrs = le_u32.parse_next(i)?;
        let header_offset = le_u32.parse_next(i)?;

        let name = take(name_len).parse_next(i)?;
        let extra = take(extra_len).parse_next(i)?;
        let comment = take(comment_len).parse_next(i)?;

        Ok(Self {
            creator_version,
            reader_version,
            flags,
            method,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_nbr_start,
            internal_attrs,
            external_attrs,
            header_offset,
            name: name.to_vec(),
            extra: extra.to_vec(),
            comment: comment.to_vec(),
        })
    }

    /// Encodes this record, signature included, followed by the raw name,
    /// extra and comment bytes.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            46 + self.name.len() + self.extra.len() + self.comment.len(),
        );
        out.extend_from_slice(Self::SIGNATURE.as_bytes());
        out.push(self.creator_version.host_system.into());
        out.push(self.creator_version.version);
        out.push(self.reader_version.host_system.into());
        out.push(self.reader_version.version);
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&u16::from(self.method).to_le_bytes());
        out.extend_from_slice(&self.modified.to_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.disk_nbr_start.to_le_bytes());
        out.extend_from_slice(&self.internal_attrs.to_le_bytes());
        out.extend_from_slice(&self.external_attrs.to_le_bytes());
        out.extend_from_slice(&self.header_offset.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        out
    }

    /// Returns true if the name or comment is not valid UTF-8
    pub fn is_non_utf8(&self) -> bool {
        let (valid1, require1) = detect_utf8(&self.name[..]);
        let (valid2, require2) = detect_utf8(&self.comment[..]);
        if !valid1 || !valid2 {
            // definitely not utf-8
            return true;
        }

        if !require1 && !require2 {
            // name and comment only use single-byte runes that overlap with UTF-8
            return false;
        }

        // Might be UTF-8, might be some other encoding; preserve existing flag.
        // Some ZIP writers use UTF-8 encoding without setting the UTF-8 flag.
        // Since it is impossible to always distinguish valid UTF-8 from some
        // other encoding (e.g., GBK or Shift-JIS), we trust the flag.
        self.flags & 0x800 == 0
    }

    /// Converts the directory header into an [Entry]: this involves parsing
    /// the extra fields, resolving the Zip64 promotion, and converting
    /// timestamps.
    pub fn as_entry(&self, encoding: Encoding, global_offset: u64) -> Result<Entry, Error> {
        let mut name = encoding.decode(&self.name)?;
        let comment = if self.comment.is_empty() {
            None
        } else {
            Some(encoding.decode(&self.comment)?)
        };

        let mut compressed_size = self.compressed_size as u64;
        let mut uncompressed_size = self.uncompressed_size as u64;
        let mut header_offset = self.header_offset as u64 + global_offset;

        let settings = ExtraFieldSettings {
            uncompressed_size_u32: self.uncompressed_size,
            compressed_size_u32: self.compressed_size,
            header_offset_u32: self.header_offset,
        };

        let mut extra_fields: Vec<ExtraField> = Vec::new();
        let mut slice = Partial::new(&self.extra[..]);
        while !slice.is_empty() {
            match ExtraField::mk_parser(settings).parse_next(&mut slice) {
                Ok(ef) => {
                    if let ExtraField::Zip64(z64) = &ef {
                        if self.uncompressed_size == u32::MAX {
                            uncompressed_size = z64.uncompressed_size;
                        }
                        if self.compressed_size == u32::MAX {
                            compressed_size = z64.compressed_size;
                        }
                        if self.header_offset == u32::MAX {
                            header_offset = z64.header_offset + global_offset;
                        }
                    }
                    extra_fields.push(ef);
                }
                Err(e) => {
                    // Malformed extra field *framing* (not just an unknown
                    // tag, which mk_parser already swallows into Unknown):
                    // skip the rest of this entry's extra blob rather than
                    // failing the whole central directory parse.
                    trace!("extra field framing error, skipping rest: {:#?}", e);
                    break;
                }
            }
        }

        // Info-ZIP Unicode Path extra (0x7075): only trust it when its CRC-32
        // matches the name actually stored in the header, and only when it
        // doesn't change whether the name looks like a directory -- a stale
        // extra field surviving a rename is the usual way this goes wrong.
        if let Some(ExtraField::UnicodePath(up)) =
            extra_fields.iter().find(|ef| matches!(ef, ExtraField::UnicodePath(_)))
        {
            if up.name_crc32 == crc32fast::hash(&self.name) {
                if let Ok(candidate) = std::str::from_utf8(&up.name) {
                    if candidate.ends_with('/') == name.ends_with('/') {
                        name = candidate.to_string();
                    }
                }
            }
        }

        let modified = self
            .modified
            .to_datetime()
            .unwrap_or_else(crate::parse::zero_datetime);

        let mut mode: Mode = match self.creator_version.host_system {
            HostSystem::Unix | HostSystem::Osx => UnixMode(self.external_attrs >> 16).into(),
            HostSystem::WindowsNtfs | HostSystem::Vfat | HostSystem::MsDos => {
                MsdosMode(self.external_attrs).into()
            }
            _ => Mode(0),
        };
        if name.ends_with('/') {
            // believe it or not, this is straight from the APPNOTE
            mode |= Mode::DIR;
        }

        Ok(Entry::from_central_directory(
            name,
            comment,
            self.creator_version,
            self.reader_version,
            self.flags,
            self.method,
            modified,
            self.crc32,
            compressed_size,
            uncompressed_size,
            self.internal_attrs,
            mode,
            header_offset,
            extra_fields,
        ))
    }
}
