#![warn(missing_docs)]

//! zipcraft reads, mutates and rewrites ZIP archives: Zip64, ZipCrypto and
//! WinZip AES encryption, DEFLATE/BZIP2, and zip-align-style data alignment.
//!
//! It's made up of winnow parsers that turn byte buffers into the pieces of
//! a zip file ([parse]), an in-memory model of an archive and its entries
//! ([model]), decryption/encryption primitives ([crypto]), a reader and
//! writer built on top of all of that ([reader], [writer]), and a
//! high-level facade ([ZipArchive]) tying it all together.

pub mod crypto;
pub mod encoding;
pub mod error;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod reader;
pub mod source;
pub mod writer;
mod zip_archive;

pub use error::Error;
pub use model::{Archive, DataSource, Entry, EntryKind};
pub use zip_archive::{ReaderOptions, WriterOptions, ZipArchive};
