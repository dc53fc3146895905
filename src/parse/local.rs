use crate::parse::{Method, MsdosTimestamp, Version, ZipBytes, ZipString};

use winnow::{
    binary::{le_u16, le_u32, le_u64},
    combinator::opt,
    seq,
    token::tag,
    PResult, Parser, Partial,
};

/// 4.3.7 Local file header
#[derive(Debug)]
pub struct LocalFileHeaderRecord {
    /// version needed to extract
    pub reader_version: Version,

    /// general purpose bit flag
    pub flags: u16,

    /// compression method
    pub method: Method,

    /// last mod file datetime
    pub modified: MsdosTimestamp,

    /// crc-32
    pub crc32: u32,

    /// compressed size
    pub compressed_size: u32,

    /// uncompressed size
    pub uncompressed_size: u32,

    /// file name
    pub name: ZipString,

    /// extra field
    pub extra: ZipBytes,
}

impl LocalFileHeaderRecord {
    /// The signature for a local file header
    pub const SIGNATURE: &'static str = "PK\x03\x04";

    /// Parser for the local file header
    pub fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let _ = tag(Self::SIGNATURE).parse_next(i)?;

        let reader_version = Version::parser.parse_next(i)?;
        let flags = le_u16.parse_next(i)?;
        let method = le_u16.parse_next(i).map(Method::from)?;
        let modified = MsdosTimestamp::parser.parse_next(i)?;
        let crc32 = le_u32.parse_next(i)?;
        let compressed_size = le_u32.parse_next(i)?;
        let uncompressed_size = le_u32.parse_next(i)?;

        let name_len = le_u16.parse_next(i)?;
        let extra_len = le_u16.parse_next(i)?;

        let name = ZipString::parser(name_len).parse_next(i)?;
        let extra = ZipBytes::parser(extra_len).parse_next(i)?;

        Ok(Self {
            reader_version,
            flags,
            method,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    /// Check for the presence of the bit flag that indicates a data descriptor
    /// is present after the file data.
    pub fn has_data_descriptor(&self) -> bool {
        // 4.3.9.1 This descriptor MUST exist if bit 3 of the general
        // purpose bit flag is set (see below).
        self.flags & 0b1000 != 0
    }

    /// Whether the UTF-8 language encoding flag (bit 11, "Language encoding
    /// flag (EFS)") is set.
    pub fn is_utf8(&self) -> bool {
        self.flags & 0x800 != 0
    }

    /// Encodes the fixed portion of a local file header, followed by the raw
    /// name and extra field bytes (not stored in [Self::name]/[Self::extra],
    /// which are only populated by [Self::parser]; the writer builds these
    /// directly from an entry's current name/extra bytes instead).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn encode(
        reader_version: Version,
        flags: u16,
        method: Method,
        modified: MsdosTimestamp,
        crc32: u32,
        compressed_size: u32,
        uncompressed_size: u32,
        name: &[u8],
        extra: &[u8],
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(30 + name.len() + extra.len());
        out.extend_from_slice(Self::SIGNATURE.as_bytes());
        out.push(reader_version.host_system.into());
        out.push(reader_version.version);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&u16::from(method).to_le_bytes());
        out.extend_from_slice(&modified.to_bytes());
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&compressed_size.to_le_bytes());
        out.extend_from_slice(&uncompressed_size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(extra);
        out
    }
}

/// 4.3.9  Data descriptor
#[derive(Debug)]
pub struct DataDescriptorRecord {
    /// CRC32 checksum
    pub crc32: u32,
    /// Compressed size
    pub compressed_size: u64,
    /// Uncompressed size
    pub uncompressed_size: u64,
}

impl DataDescriptorRecord {
    const SIGNATURE: &'static str = "PK\x07\x08";

    /// Create a parser for the data descriptor record.
    pub fn mk_parser(is_zip64: bool) -> impl FnMut(&mut Partial<&'_ [u8]>) -> PResult<Self> {
        move |i| {
            // From appnote.txt:
            //
            // 4.3.9.3 Although not originally assigned a signature, the value
            // 0x08074b50 has commonly been adopted as a signature value for the
            // data descriptor record.  Implementers SHOULD be aware that ZIP files
            // MAY be encountered with or without this signature marking data
            // descriptors and SHOULD account for either case when reading ZIP files
            // to ensure compatibility.
            let _ = opt(tag(Self::SIGNATURE)).parse_next(i)?;

            if is_zip64 {
                seq! {Self {
                    crc32: le_u32,
                    compressed_size: le_u64,
                    uncompressed_size: le_u64,
                }}
                .parse_next(i)
            } else {
                seq! {Self {
                    crc32: le_u32,
                    compressed_size: le_u32.map(|x| x as u64),
                    uncompressed_size: le_u32.map(|x| x as u64),
                }}
                .parse_next(i)
            }
        }
    }

    /// Encodes this record, signature included, using 64-bit size fields
    /// when `is_zip64` is set.
    pub(crate) fn encode(&self, is_zip64: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        out.extend_from_slice(Self::SIGNATURE.as_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if is_zip64 {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
            out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
        }
        out
    }
}
