//! All error types used in this crate

use crate::parse::Method;

use super::encoding;

/// Any zip-related error, from invalid archives to encoding problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not a valid zip file, or a variant that is unsupported.
    #[error("format: {0}")]
    Format(#[from] FormatError),

    /// Something is not supported by this crate
    #[error("unsupported: {0}")]
    Unsupported(#[from] UnsupportedError),

    /// Invalid UTF-8, Shift-JIS, or any problem encountered while decoding text in general.
    #[error("encoding: {0:?}")]
    Encoding(#[from] encoding::DecodingError),

    /// A requested entry, by name, does not exist in the archive.
    #[error("no such entry: {0}")]
    NotFound(String),

    /// A rename or insert collided with an existing entry name.
    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    /// A parameter failed validation: empty/too-long name, out-of-range
    /// compression level, missing glob/regex pattern, and so on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The uncompressed payload's CRC-32 did not match the value recorded
    /// in the archive.
    #[error("checksum mismatch for {name:?}: expected {expected:08x}, got {actual:08x}")]
    Crc32Mismatch {
        /// name of the offending entry
        name: String,
        /// expected CRC-32, from the central directory or data descriptor
        expected: u32,
        /// actual CRC-32, computed while streaming the entry
        actual: u32,
    },

    /// Decryption failed: wrong password, or corrupted ciphertext.
    #[error("authentication failed for {name:?}: wrong password, or corrupt entry")]
    AuthenticationError {
        /// name of the offending entry
        name: String,
    },

    /// I/O-related error
    #[error("io: {0}")]
    IO(#[from] std::io::Error),

    /// Decompression-related error
    #[error("{method:?} decompression error: {msg}")]
    Decompression {
        /// The compression method that failed
        method: Method,
        /// Additional information
        msg: String,
    },

    /// Could not read as a zip because size could not be determined
    #[error("size must be known to open zip file")]
    UnknownSize,
}

impl Error {
    /// Create a new error indicating that the given method is not supported.
    pub fn method_not_supported(method: Method) -> Self {
        Self::Unsupported(UnsupportedError::MethodNotSupported(method))
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Some part of the zip format is not supported by this crate.
#[derive(Debug, thiserror::Error)]
pub enum UnsupportedError {
    /// The compression method is not supported.
    #[error("compression method not supported: {0:?}")]
    MethodNotSupported(Method),

    /// Split/spanned (multi-disk) archives are not supported.
    #[error("split (multi-disk) archives are not supported")]
    SplitArchive,

    /// PKWARE strong encryption (general purpose bit 6) is not supported.
    #[error("PKWARE strong encryption is not supported")]
    StrongEncryption,

    /// An encryption method other than ZipCrypto or WinZip AES was requested.
    #[error("encryption method not supported")]
    EncryptionMethodNotSupported,
}

/// Specific zip format errors, mostly due to invalid zip archives but that could also stem from
/// implementation shortcomings.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The end of central directory record was not found.
    ///
    /// This usually indicates that the file being read is not a zip archive.
    #[error("end of central directory record not found")]
    DirectoryEndSignatureNotFound,

    /// The zip64 end of central directory record could not be parsed.
    ///
    /// This is only returned when a zip64 end of central directory *locator* was found,
    /// so the archive should be zip64, but isn't.
    #[error("zip64 end of central directory record not found")]
    Directory64EndRecordInvalid,

    /// Corrupted/partial zip file: the offset we found for the central directory
    /// points outside of the current file.
    #[error("directory offset points outside of file")]
    DirectoryOffsetPointsOutsideFile,

    /// The central record is corrupted somewhat.
    ///
    /// This can happen when the end of central directory record advertises
    /// a certain number of files, but we weren't able to read the same number of central directory
    /// headers.
    #[error("invalid central record: expected to read {expected} files, got {actual}")]
    InvalidCentralRecord {
        /// expected number of files
        expected: u64,
        /// actual number of files
        actual: u64,
    },

    /// The header offset of an entry is invalid.
    ///
    /// This can indicate an invalid zip archive, or an invalid user-provided global offset
    #[error("invalid header offset")]
    InvalidHeaderOffset,

    /// An archive or entry comment, or an entry name, exceeded 65535 bytes.
    #[error("{0} too long: {1} bytes (max 65535)")]
    FieldTooLong(&'static str, usize),

    /// An entry name failed the non-empty/length/separator invariants.
    #[error("invalid entry name: {0}")]
    InvalidEntryName(String),

    /// End of central directory record claims an impossible number of files.
    ///
    /// Each entry takes a minimum amount of size, so if the overall archive size is smaller than
    /// claimed_records_count * minimum_entry_size, we know it's not a valid zip file.
    #[error("impossible number of files: claims to have {claimed_records_count}, but zip size is {zip_size}")]
    ImpossibleNumberOfFiles {
        /// number of files claimed in the end of central directory record
        claimed_records_count: u64,
        /// total size of the zip file
        zip_size: u64,
    },

    /// The local file header (before the file data) could not be parsed correctly.
    #[error("invalid local file header")]
    InvalidLocalHeader,

    /// The data descriptor (after the file data) could not be parsed correctly.
    #[error("invalid data descriptor")]
    InvalidDataDescriptor,

    /// The uncompressed size didn't match.
    ///
    /// CRC-32 mismatches are reported separately, via [Error::Crc32Mismatch],
    /// since they name the offending entry and are checked after decompression
    /// rather than while parsing the format.
    #[error("uncompressed size didn't match: expected {expected}, got {actual}")]
    WrongSize {
        /// expected size in bytes (from the local header, data descriptor, etc.)
        expected: u64,
        /// actual size in bytes (from decompressing the entry)
        actual: u64,
    },
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::IO(e) => e,
            e => std::io::Error::other(e),
        }
    }
}
