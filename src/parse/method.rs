use winnow::{binary::le_u16, PResult, Partial};

/// Compression method used for a file entry, as stored in the local and
/// central directory headers.
///
/// Only [Method::Store], [Method::Deflate] and [Method::Bzip2] are actually
/// supported for compression/decompression by this crate; any other method
/// read from an archive is preserved as [Method::Unrecognized] so that the
/// entry's metadata can still be inspected (and the method rejected with
/// [crate::error::UnsupportedError::MethodNotSupported] if extraction is
/// attempted).
///
/// [Method::Aex] (99) denotes a WinZip AES-encrypted entry: the *real*
/// compression method is recorded in the AE-x extra field (tag 0x9901)
/// instead, see [crate::parse::ExtraField::WinZipAes].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Method {
    /// No compression is applied
    Store = Self::STORE,

    /// [DEFLATE (RFC 1951)](https://www.ietf.org/rfc/rfc1951.txt)
    Deflate = Self::DEFLATE,

    /// [BZIP-2](https://github.com/dsnet/compress/blob/master/doc/bzip2-format.pdf)
    Bzip2 = Self::BZIP2,

    /// AE-x encryption marker (see Appendix E of appnote)
    Aex = Self::AEX,

    /// A compression method that isn't recognized (or supported) by this crate.
    Unrecognized(u16),
}

impl Method {
    const STORE: u16 = 0;
    const DEFLATE: u16 = 8;
    const BZIP2: u16 = 12;
    const AEX: u16 = 99;

    /// Parse a method from a byte slice
    pub fn parser(i: &mut Partial<&[u8]>) -> PResult<Self> {
        le_u16(i).map(From::from)
    }

    /// Whether this crate can actually compress/decompress this method.
    pub fn is_supported(&self) -> bool {
        matches!(self, Method::Store | Method::Deflate | Method::Bzip2)
    }
}

impl From<u16> for Method {
    fn from(u: u16) -> Self {
        match u {
            Self::STORE => Self::Store,
            Self::DEFLATE => Self::Deflate,
            Self::BZIP2 => Self::Bzip2,
            Self::AEX => Self::Aex,
            u => Self::Unrecognized(u),
        }
    }
}

impl From<Method> for u16 {
    fn from(method: Method) -> Self {
        match method {
            Method::Store => Method::STORE,
            Method::Deflate => Method::DEFLATE,
            Method::Bzip2 => Method::BZIP2,
            Method::Aex => Method::AEX,
            Method::Unrecognized(u) => u,
        }
    }
}
