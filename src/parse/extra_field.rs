use winnow::{
    binary::{le_u16, le_u32, le_u64, le_u8, length_take},
    combinator::{opt, repeat_till},
    error::{ErrMode, ErrorKind, ParserError},
    seq,
    token::{literal, take},
    PResult, Parser, Partial,
};

use crate::parse::NtfsTimestamp;

/// 4.4.28 extra field: (Variable)
pub(crate) struct ExtraFieldRecord<'a> {
    pub(crate) tag: u16,
    pub(crate) payload: &'a [u8],
}

impl<'a> ExtraFieldRecord<'a> {
    pub(crate) fn parser(i: &mut Partial<&'a [u8]>) -> PResult<Self> {
        seq! {Self {
            tag: le_u16,
            payload: length_take(le_u16),
        }}
        .parse_next(i)
    }
}

/// Useful because zip64 extended information extra field has fixed order *but*
/// optional fields. From the appnote:
///
/// If one of the size or offset fields in the Local or Central directory record
/// is too small to hold the required data, a Zip64 extended information record
/// is created. The order of the fields in the zip64 extended information record
/// is fixed, but the fields MUST only appear if the corresponding Local or
/// Central directory record field is set to 0xFFFF or 0xFFFFFFFF.
#[derive(Debug, Clone, Copy)]
pub struct ExtraFieldSettings {
    /// The uncompressed size field read from a local or central directory record
    /// If this is 0xFFFF_FFFF, then the zip64 extra field uncompressed size
    /// field will be present.
    pub uncompressed_size_u32: u32,

    /// The compressed size field read from a local or central directory record
    /// If this is 0xFFFF_FFFF, then the zip64 extra field compressed size
    /// field will be present.
    pub compressed_size_u32: u32,

    /// The header offset field read from a central directory record (or zero
    /// for local directory records). If this is 0xFFFF_FFFF, then the zip64
    /// extra field header offset field will be present.
    pub header_offset_u32: u32,
}

/// Information stored in a local or central directory header's `extra` field.
///
/// This typically contains timestamps, file sizes and offsets, file mode,
/// uid/gid, encryption parameters, etc. Each recognized tag decodes into its
/// own variant; everything else is kept as [ExtraField::Unknown] with its
/// raw payload so it can be round-tripped through a rewrite.
#[derive(Clone)]
pub enum ExtraField {
    /// Zip64 extended information extra field (0x0001)
    Zip64(ExtraZip64Field),
    /// Extended timestamp (0x5455)
    Timestamp(ExtraTimestampField),
    /// UNIX & Info-Zip UNIX (0x000d / 0x5855)
    Unix(ExtraUnixField),
    /// New UNIX extra field (0x7875)
    NewUnix(ExtraNewUnixField),
    /// NTFS (Win9x/WinNT FileTimes) (0x000a)
    Ntfs(ExtraNtfsField),
    /// ASI Unix extra field (0x756e)
    AsiUnix(ExtraAsiUnixField),
    /// Info-ZIP Unicode Path extra field (0x7075)
    UnicodePath(ExtraUnicodePathField),
    /// WinZip AES extra field (0x9901)
    WinZipAes(ExtraWinZipAesField),
    /// Unknown extra field, with tag and raw payload (preserved for rewrite)
    Unknown {
        /// tag of the extra field
        tag: u16,
        /// raw payload, preserved verbatim
        data: Vec<u8>,
    },
}

pub(crate) fn record(tag: u16, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

impl ExtraField {
    /// Encodes this field back into `[tag][len][payload]` form, as it would
    /// be written into a local header or central directory record's extra
    /// field area.
    ///
    /// [ExtraField::Zip64] is handled specially by the writer (it's
    /// synthesized fresh from the entry's final sizes/offset, not carried
    /// through verbatim), but encoding it here too keeps the codec registry
    /// symmetric per entry.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            ExtraField::Zip64(z) => record(Self::HEADER_ID_ZIP64, z.encode(true)),
            ExtraField::Timestamp(ts) => record(ExtraTimestampField::TAG, ts.encode()),
            ExtraField::Unix(u) => record(ExtraUnixField::TAG_INFOZIP, u.encode()),
            ExtraField::NewUnix(u) => record(ExtraNewUnixField::TAG, u.encode()),
            ExtraField::Ntfs(n) => record(ExtraNtfsField::TAG, n.encode()),
            ExtraField::AsiUnix(a) => record(ExtraAsiUnixField::TAG, a.encode()),
            ExtraField::UnicodePath(u) => record(ExtraUnicodePathField::TAG, u.encode()),
            ExtraField::WinZipAes(a) => record(ExtraWinZipAesField::TAG, a.encode()),
            ExtraField::Unknown { tag, data } => record(*tag, data.clone()),
        }
    }

    const HEADER_ID_ZIP64: u16 = ExtraZip64Field::TAG;

    /// The header id this field would be encoded under.
    pub fn header_id(&self) -> u16 {
        match self {
            ExtraField::Zip64(_) => ExtraZip64Field::TAG,
            ExtraField::Timestamp(_) => ExtraTimestampField::TAG,
            ExtraField::Unix(_) => ExtraUnixField::TAG_INFOZIP,
            ExtraField::NewUnix(_) => ExtraNewUnixField::TAG,
            ExtraField::Ntfs(_) => ExtraNtfsField::TAG,
            ExtraField::AsiUnix(_) => ExtraAsiUnixField::TAG,
            ExtraField::UnicodePath(_) => ExtraUnicodePathField::TAG,
            ExtraField::WinZipAes(_) => ExtraWinZipAesField::TAG,
            ExtraField::Unknown { tag, .. } => *tag,
        }
    }

    /// Make a parser for extra fields, given the settings for the zip64 extra
    /// field (which depend on whether the u32 values are 0xFFFF_FFFF or not).
    ///
    /// Per-field decoding errors are swallowed: a recognized tag whose payload
    /// doesn't parse falls back to [ExtraField::Unknown] rather than aborting
    /// the whole extra-field stream.
    pub fn mk_parser(
        settings: ExtraFieldSettings,
    ) -> impl FnMut(&mut Partial<&[u8]>) -> PResult<Self> {
        move |i| {
            use ExtraField as EF;
            let rec = ExtraFieldRecord::parser.parse_next(i)?;
            let payload = &mut Partial::new(rec.payload);

            let variant = match rec.tag {
                ExtraZip64Field::TAG => opt(ExtraZip64Field::mk_parser(settings).map(EF::Zip64))
                    .parse_next(payload)?,
                ExtraTimestampField::TAG => {
                    opt(ExtraTimestampField::parser.map(EF::Timestamp)).parse_next(payload)?
                }
                ExtraNtfsField::TAG => {
                    opt(ExtraNtfsField::parser.map(EF::Ntfs)).parse_next(payload)?
                }
                ExtraUnixField::TAG | ExtraUnixField::TAG_INFOZIP => {
                    opt(ExtraUnixField::parser.map(EF::Unix)).parse_next(payload)?
                }
                ExtraNewUnixField::TAG => {
                    opt(ExtraNewUnixField::parser.map(EF::NewUnix)).parse_next(payload)?
                }
                ExtraAsiUnixField::TAG => {
                    opt(ExtraAsiUnixField::parser.map(EF::AsiUnix)).parse_next(payload)?
                }
                ExtraUnicodePathField::TAG => {
                    opt(ExtraUnicodePathField::parser.map(EF::UnicodePath)).parse_next(payload)?
                }
                ExtraWinZipAesField::TAG => {
                    opt(ExtraWinZipAesField::parser.map(EF::WinZipAes)).parse_next(payload)?
                }
                _ => None,
            }
            .unwrap_or_else(|| EF::Unknown {
                tag: rec.tag,
                data: rec.payload.to_vec(),
            });

            Ok(variant)
        }
    }
}

/// 4.5.3 -Zip64 Extended Information Extra Field (0x0001)
#[derive(Clone, Default)]
pub struct ExtraZip64Field {
    /// 64-bit uncompressed size
    pub uncompressed_size: u64,

    /// 64-bit compressed size
    pub compressed_size: u64,

    /// 64-bit header offset
    pub header_offset: u64,

    /// 32-bit disk start number
    pub disk_start: Option<u32>,
}

impl ExtraZip64Field {
    const TAG: u16 = 0x0001;

    pub(crate) fn mk_parser(
        settings: ExtraFieldSettings,
    ) -> impl FnMut(&mut Partial<&'_ [u8]>) -> PResult<Self> {
        move |i| {
            let uncompressed_size = if settings.uncompressed_size_u32 == 0xFFFF_FFFF {
                le_u64.parse_next(i)?
            } else {
                settings.uncompressed_size_u32 as u64
            };
            let compressed_size = if settings.compressed_size_u32 == 0xFFFF_FFFF {
                le_u64.parse_next(i)?
            } else {
                settings.compressed_size_u32 as u64
            };
            let header_offset = if settings.header_offset_u32 == 0xFFFF_FFFF {
                le_u64.parse_next(i)?
            } else {
                settings.header_offset_u32 as u64
            };
            let disk_start = opt(le_u32.complete_err()).parse_next(i)?;

            Ok(Self {
                uncompressed_size,
                compressed_size,
                header_offset,
                disk_start,
            })
        }
    }

    /// Encodes the fields present in `self` (all of them, unconditionally);
    /// the writer is responsible for only constructing a [ExtraZip64Field]
    /// with the fields that actually need promoting, since the field order
    /// is fixed but each field is optional depending on which 32-bit slot
    /// overflowed.
    pub(crate) fn encode(&self, include_disk_start: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        out.extend_from_slice(&self.compressed_size.to_le_bytes());
        out.extend_from_slice(&self.header_offset.to_le_bytes());
        if include_disk_start {
            out.extend_from_slice(&self.disk_start.unwrap_or(0).to_le_bytes());
        }
        out
    }

    /// Encodes this field as a full `[tag][len][payload]` record carrying
    /// just the uncompressed/compressed sizes, for a local header's extra
    /// field: local headers have no header offset or disk number to promote.
    pub(crate) fn encode_local_record(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        payload.extend_from_slice(&self.compressed_size.to_le_bytes());
        record(Self::TAG, payload)
    }
}

/// Extended timestamp extra field (0x5455)
#[derive(Clone, Default)]
pub struct ExtraTimestampField {
    /// number of seconds since epoch, if the modification-time bit was set
    pub mtime: Option<u32>,
    /// number of seconds since epoch, if the access-time bit was set
    pub atime: Option<u32>,
    /// number of seconds since epoch, if the creation-time bit was set
    pub ctime: Option<u32>,
}

impl ExtraTimestampField {
    const TAG: u16 = 0x5455;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let flags = le_u8.parse_next(i)?;
        let mtime = if flags & 0b001 != 0 {
            Some(le_u32.parse_next(i)?)
        } else {
            None
        };
        let atime = if flags & 0b010 != 0 {
            opt(le_u32.complete_err()).parse_next(i)?
        } else {
            None
        };
        let ctime = if flags & 0b100 != 0 {
            opt(le_u32.complete_err()).parse_next(i)?
        } else {
            None
        };
        Ok(Self {
            mtime,
            atime,
            ctime,
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.mtime.is_some() {
            flags |= 0b001;
        }
        if self.atime.is_some() {
            flags |= 0b010;
        }
        if self.ctime.is_some() {
            flags |= 0b100;
        }
        let mut out = vec![flags];
        for t in [self.mtime, self.atime, self.ctime].into_iter().flatten() {
            out.extend_from_slice(&t.to_le_bytes());
        }
        out
    }
}

/// 4.5.7 -UNIX Extra Field (0x000d) / Info-Zip Old UNIX Extra Field (0x5855)
#[derive(Clone)]
pub struct ExtraUnixField {
    /// file last access time
    pub atime: u32,
    /// file last modification time
    pub mtime: u32,
    /// file user id
    pub uid: u16,
    /// file group id
    pub gid: u16,
    /// variable length data field (symlink target, device numbers, etc.)
    pub data: Vec<u8>,
}

impl ExtraUnixField {
    const TAG: u16 = 0x000d;
    const TAG_INFOZIP: u16 = 0x5855;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        seq! {Self {
            atime: le_u32,
            mtime: le_u32,
            uid: le_u16,
            gid: le_u16,
            data: winnow::combinator::rest.map(|s: &[u8]| s.to_vec()),
        }}
        .parse_next(i)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.data.len());
        out.extend_from_slice(&self.atime.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Info-ZIP New Unix Extra Field (0x7875):
///
/// Currently stores Unix UIDs/GIDs up to 64 bits.
///
/// ```text
/// Value         Size        Description
/// -----         ----        -----------
/// 0x7875        Short       tag for this extra block type ("ux")
/// TSize         Short       total data size for this block
/// Version       1 byte      version of this extra field, currently 1
/// UIDSize       1 byte      Size of UID field
/// UID           Variable    UID for this entry
/// GIDSize       1 byte      Size of GID field
/// GID           Variable    GID for this entry
/// ```
#[derive(Clone)]
pub struct ExtraNewUnixField {
    /// file user id
    pub uid: u64,

    /// file group id
    pub gid: u64,
}

impl ExtraNewUnixField {
    const TAG: u16 = 0x7875;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let _ = literal("\x01").parse_next(i)?;
        seq! {Self {
            uid: Self::parse_variable_length_integer,
            gid: Self::parse_variable_length_integer,
        }}
        .parse_next(i)
    }

    fn parse_variable_length_integer(i: &mut Partial<&'_ [u8]>) -> PResult<u64> {
        let slice = length_take(le_u8).parse_next(i)?;
        if let Some(u) = match slice.len() {
            1 => Some(le_u8.parse_peek(slice)?.1 as u64),
            2 => Some(le_u16.parse_peek(slice)?.1 as u64),
            4 => Some(le_u32.parse_peek(slice)?.1 as u64),
            8 => Some(le_u64.parse_peek(slice)?.1),
            _ => None,
        } {
            Ok(u)
        } else {
            Err(ErrMode::from_error_kind(i, ErrorKind::Alt))
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = vec![1u8];
        Self::encode_variable_length_integer(self.uid, &mut out);
        Self::encode_variable_length_integer(self.gid, &mut out);
        out
    }

    fn encode_variable_length_integer(v: u64, out: &mut Vec<u8>) {
        let bytes = v.to_le_bytes();
        let len = if v <= u8::MAX as u64 {
            1
        } else if v <= u16::MAX as u64 {
            2
        } else if v <= u32::MAX as u64 {
            4
        } else {
            8
        };
        out.push(len as u8);
        out.extend_from_slice(&bytes[..len]);
    }
}

/// ASI UNIX Extra Field (0x756e): an older, less common way of storing Unix
/// mode, uid/gid and symlink targets, predating the New Unix field.
///
/// ```text
/// Value      Size      Description
/// -----      ----      -----------
/// CRC        4 bytes   CRC-32 of the remainder of the data
/// Mode       2 bytes   file permissions
/// SizDev     4 bytes   size of device (st_rdev), if special file
/// UID        2 bytes   user id
/// GID        2 bytes   group id
/// (var)      variable  symbolic link filename, if a symlink
/// ```
#[derive(Clone)]
pub struct ExtraAsiUnixField {
    /// CRC-32 of the fields below (mode, sizdev, uid, gid, link target)
    pub crc: u32,
    /// Unix file mode (st_mode)
    pub mode: u16,
    /// device number, for character/block special files
    pub size_dev: u32,
    /// user id
    pub uid: u16,
    /// group id
    pub gid: u16,
    /// symlink target, if `mode` denotes a symbolic link; empty otherwise
    pub link_target: Vec<u8>,
}

impl ExtraAsiUnixField {
    const TAG: u16 = 0x756e;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        seq! {Self {
            crc: le_u32,
            mode: le_u16,
            size_dev: le_u32,
            uid: le_u16,
            gid: le_u16,
            link_target: winnow::combinator::rest.map(|s: &[u8]| s.to_vec()),
        }}
        .parse_next(i)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14 + self.link_target.len());
        out.extend_from_slice(&self.crc.to_le_bytes());
        out.extend_from_slice(&self.mode.to_le_bytes());
        out.extend_from_slice(&self.size_dev.to_le_bytes());
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.link_target);
        out
    }
}

/// Info-ZIP Unicode Path Extra Field (0x7075): carries a UTF-8 override for
/// the entry name, guarded by a CRC-32 of the (possibly non-UTF-8) name
/// stored in the header proper.
///
/// ```text
/// Value      Size      Description
/// -----      ----      -----------
/// Version    1 byte    version of this extra field, currently 1
/// NameCRC32  4 bytes   CRC-32 of the original name field
/// UnicodeName variable UTF-8 encoded name
/// ```
#[derive(Clone)]
pub struct ExtraUnicodePathField {
    /// version of this extra field, currently 1
    pub version: u8,
    /// CRC-32 of the entry's (possibly non-UTF-8) name field
    pub name_crc32: u32,
    /// the UTF-8 override name
    pub name: Vec<u8>,
}

impl ExtraUnicodePathField {
    const TAG: u16 = 0x7075;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        seq! {Self {
            version: le_u8,
            name_crc32: le_u32,
            name: winnow::combinator::rest.map(|s: &[u8]| s.to_vec()),
        }}
        .parse_next(i)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.name.len());
        out.push(self.version);
        out.extend_from_slice(&self.name_crc32.to_le_bytes());
        out.extend_from_slice(&self.name);
        out
    }
}

/// WinZip AES Extra Field (0x9901): marks an entry as AES-encrypted and
/// records the key strength and the compression method that applied before
/// encryption (since [crate::parse::Method::Aex] stands in for it in the
/// header's own method field).
///
/// ```text
/// Value       Size      Description
/// -----       ----      -----------
/// Version     2 bytes   1 (AE-1) or 2 (AE-2)
/// Vendor      2 bytes   "AE"
/// Strength    1 byte    1 = 128-bit, 2 = 192-bit, 3 = 256-bit
/// Method      2 bytes   real compression method
/// ```
#[derive(Clone, Copy)]
pub struct ExtraWinZipAesField {
    /// 1 for AE-1 (CRC checked), 2 for AE-2 (CRC set to 0, not checked)
    pub version: u16,
    /// key strength: 1 = 128-bit, 2 = 192-bit, 3 = 256-bit
    pub strength: u8,
    /// the compression method that applies to the decrypted plaintext
    pub method: u16,
}

impl ExtraWinZipAesField {
    const TAG: u16 = 0x9901;
    const VENDOR: &'static str = "AE";

    /// AES key length in bits for this field's declared strength.
    pub fn key_bits(&self) -> Option<u32> {
        match self.strength {
            1 => Some(128),
            2 => Some(192),
            3 => Some(256),
            _ => None,
        }
    }

    /// Salt length in bytes for this field's declared strength (key_bits / 16).
    pub fn salt_len(&self) -> Option<usize> {
        self.key_bits().map(|bits| (bits / 16) as usize)
    }

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let version = le_u16.parse_next(i)?;
        let _ = literal(Self::VENDOR).parse_next(i)?;
        let strength = le_u8.parse_next(i)?;
        let method = le_u16.parse_next(i)?;
        Ok(Self {
            version,
            strength,
            method,
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(Self::VENDOR.as_bytes());
        out.push(self.strength);
        out.extend_from_slice(&self.method.to_le_bytes());
        out
    }
}

/// 4.5.5 -NTFS Extra Field (0x000a):
#[derive(Clone)]
pub struct ExtraNtfsField {
    /// NTFS attributes
    pub attrs: Vec<NtfsAttr>,
}

impl ExtraNtfsField {
    const TAG: u16 = 0x000a;

    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let _ = take(4_usize).parse_next(i)?; // reserved (unused)
        seq! {Self {
            // from the winnow docs:
            //   Parsers like repeat do not know when an eof is from insufficient
            //   data or the end of the stream, causing them to always report
            //   Incomplete.
            // using repeat_till with eof combinator to work around this:
            attrs: repeat_till(0.., NtfsAttr::parser, winnow::combinator::eof).map(|x| x.0),
        }}
        .parse_next(i)
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; 4]; // reserved
        for attr in &self.attrs {
            out.extend_from_slice(&attr.encode());
        }
        out
    }
}

/// NTFS attribute for zip entries (mostly timestamps)
#[derive(Clone)]
pub enum NtfsAttr {
    /// NTFS attribute 1, which contains modified/accessed/created timestamps
    Attr1(NtfsAttr1),

    /// Unknown NTFS attribute
    Unknown {
        /// tag of the attribute
        tag: u16,
    },
}

impl NtfsAttr {
    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        let tag = le_u16.parse_next(i)?;
        let payload = length_take(le_u16).parse_next(i)?;

        match tag {
            0x0001 => NtfsAttr1::parser
                .parse_peek(Partial::new(payload))
                .map(|(_, attr)| NtfsAttr::Attr1(attr)),
            _ => Ok(NtfsAttr::Unknown { tag }),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            NtfsAttr::Attr1(attr) => {
                let payload = attr.encode();
                let mut out = Vec::with_capacity(4 + payload.len());
                out.extend_from_slice(&0x0001u16.to_le_bytes());
                out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
                out.extend_from_slice(&payload);
                out
            }
            NtfsAttr::Unknown { .. } => Vec::new(),
        }
    }
}

/// NTFS attribute 1, which contains modified/accessed/created timestamps
#[derive(Clone)]
pub struct NtfsAttr1 {
    /// modified time
    pub mtime: NtfsTimestamp,

    /// accessed time
    pub atime: NtfsTimestamp,

    /// created time
    pub ctime: NtfsTimestamp,
}

impl NtfsAttr1 {
    fn parser(i: &mut Partial<&'_ [u8]>) -> PResult<Self> {
        seq! {Self {
            mtime: NtfsTimestamp::parser,
            atime: NtfsTimestamp::parser,
            ctime: NtfsTimestamp::parser,
        }}
        .parse_next(i)
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24);
        out.extend_from_slice(&self.mtime.timestamp.to_le_bytes());
        out.extend_from_slice(&self.atime.timestamp.to_le_bytes());
        out.extend_from_slice(&self.ctime.timestamp.to_le_bytes());
        out
    }
}
