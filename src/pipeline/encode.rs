use std::io::{self, Write};

use bzip2::write::BzEncoder;
use bzip2::Compression as BzCompression;
use flate2::write::DeflateEncoder;
use flate2::Compression as DeflateCompression;

use crate::crypto::{
    EncryptionMethod, WinZipAesEncryptor, ZipCryptoEncryptor, ZIPCRYPTO_HEADER_LEN,
};
use crate::error::Error;
use crate::parse::Method;

/// The result of finishing an [EntryWriter]: everything the writer (4.H)
/// needs to go back and fill into the local header / data descriptor /
/// central directory record.
pub struct EntryWriteOutcome {
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Size of the uncompressed data, in bytes.
    pub uncompressed_size: u64,
    /// Size of the bytes actually written to the sink for this entry
    /// (compressed, and including any encryption header/salt/auth tag).
    pub compressed_size: u64,
}

/// Streaming compress+encrypt writer for a single entry's data (section
/// 4.G/4.H): plaintext flows in through [Write], and is, in order, CRC-32
/// accumulated, compressed, and (if the entry is encrypted) enciphered,
/// before landing in the underlying sink.
pub struct EntryWriter<W: Write> {
    compressor: Compressor<Encryptor<CountingWriter<W>>>,
    hasher: crc32fast::Hasher,
    uncompressed_size: u64,
}

impl<W: Write> EntryWriter<W> {
    /// Starts writing a new entry to `sink`. If `encryption` requires a
    /// password, `password` must be set; the encryption header (ZipCrypto's
    /// 12-byte random header, or WinZip AES's salt+verifier) is written
    /// immediately.
    ///
    /// `check_byte` is used only for ZipCrypto: per APPNOTE 6.1.3 it should
    /// be the high byte of the entry's CRC-32, but since that isn't known
    /// until the data has been fully streamed, this crate follows the
    /// common streaming-writer convention of using the high byte of the
    /// entry's DOS-format modification time instead (see DESIGN.md).
    pub fn new(
        sink: W,
        method: Method,
        encryption: EncryptionMethod,
        password: Option<&str>,
        check_byte: u8,
        compression_level: i32,
    ) -> Result<Self, Error> {
        let counting = CountingWriter::new(sink);
        let encryptor = Encryptor::new(counting, encryption, password, check_byte)?;
        let compressor = Compressor::new(encryptor, method, compression_level)?;
        Ok(Self {
            compressor,
            hasher: crc32fast::Hasher::new(),
            uncompressed_size: 0,
        })
    }

    /// Finishes compression/encryption, flushing every layer, and returns
    /// the underlying sink along with the sizes/CRC the caller needs.
    pub fn finish(self) -> io::Result<(W, EntryWriteOutcome)> {
        let encryptor = self.compressor.finish()?;
        let counting = encryptor.finish()?;
        let compressed_size = counting.count();
        Ok((
            counting.into_inner(),
            EntryWriteOutcome {
                crc32: self.hasher.finalize(),
                uncompressed_size: self.uncompressed_size,
                compressed_size,
            },
        ))
    }
}

impl<W: Write> Write for EntryWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.uncompressed_size += buf.len() as u64;
        self.compressor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.compressor.flush()
    }
}

/// Counts bytes written through it; used to learn the final on-disk
/// (compressed, post-encryption) size of an entry without a second pass.
struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }

    fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

enum Encryptor<W: Write> {
    None(W),
    ZipCrypto { inner: W, cipher: ZipCryptoEncryptor },
    WinZipAes { inner: W, cipher: WinZipAesEncryptor },
}

impl<W: Write> Encryptor<W> {
    fn new(
        mut sink: W,
        method: EncryptionMethod,
        password: Option<&str>,
        check_byte: u8,
    ) -> Result<Self, Error> {
        match method {
            EncryptionMethod::None => Ok(Encryptor::None(sink)),
            EncryptionMethod::PkwareZipCrypto => {
                let password = password.ok_or_else(|| {
                    Error::invalid_argument("a password is required to write an encrypted entry")
                })?;
                let random_header = random_bytes(ZIPCRYPTO_HEADER_LEN)?;
                let mut header = [0u8; ZIPCRYPTO_HEADER_LEN];
                header.copy_from_slice(&random_header);
                let (cipher, encrypted_header) =
                    ZipCryptoEncryptor::new(password.as_bytes(), header, check_byte);
                sink.write_all(&encrypted_header)?;
                Ok(Encryptor::ZipCrypto {
                    inner: sink,
                    cipher,
                })
            }
            method @ (EncryptionMethod::WinZipAes128
            | EncryptionMethod::WinZipAes192
            | EncryptionMethod::WinZipAes256) => {
                let password = password.ok_or_else(|| {
                    Error::invalid_argument("a password is required to write an encrypted entry")
                })?;
                let key_size = method.aes_key_size().expect("aes method has a key size");
                let salt = random_bytes(key_size.salt_len())?;
                let (cipher, verifier) = WinZipAesEncryptor::new(password.as_bytes(), key_size, &salt);
                sink.write_all(&salt)?;
                sink.write_all(&verifier)?;
                Ok(Encryptor::WinZipAes {
                    inner: sink,
                    cipher,
                })
            }
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Encryptor::None(w) => Ok(w),
            Encryptor::ZipCrypto { inner, .. } => Ok(inner),
            Encryptor::WinZipAes { mut inner, cipher } => {
                let tag = cipher.finish();
                inner.write_all(&tag)?;
                Ok(inner)
            }
        }
    }
}

impl<W: Write> Write for Encryptor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encryptor::None(w) => w.write(buf),
            Encryptor::ZipCrypto { inner, cipher } => {
                let mut scratch = buf.to_vec();
                cipher.encrypt(&mut scratch);
                inner.write_all(&scratch)?;
                Ok(buf.len())
            }
            Encryptor::WinZipAes { inner, cipher } => {
                let mut scratch = buf.to_vec();
                cipher.update(&mut scratch);
                inner.write_all(&scratch)?;
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encryptor::None(w) => w.flush(),
            Encryptor::ZipCrypto { inner, .. } => inner.flush(),
            Encryptor::WinZipAes { inner, .. } => inner.flush(),
        }
    }
}

enum Compressor<W: Write> {
    Store(W),
    Deflate(DeflateEncoder<W>),
    Bzip2(BzEncoder<W>),
}

impl<W: Write> Compressor<W> {
    fn new(inner: W, method: Method, level: i32) -> Result<Self, Error> {
        match method {
            Method::Store => Ok(Compressor::Store(inner)),
            Method::Deflate => {
                let level = if level < 0 { 6 } else { level as u32 };
                Ok(Compressor::Deflate(DeflateEncoder::new(
                    inner,
                    DeflateCompression::new(level),
                )))
            }
            Method::Bzip2 => Ok(Compressor::Bzip2(BzEncoder::new(inner, BzCompression::new(9)))),
            Method::Aex | Method::Unrecognized(_) => Err(Error::method_not_supported(method)),
        }
    }

    fn finish(self) -> io::Result<W> {
        match self {
            Compressor::Store(w) => Ok(w),
            Compressor::Deflate(e) => e.finish(),
            Compressor::Bzip2(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Compressor::Store(w) => w.write(buf),
            Compressor::Deflate(e) => e.write(buf),
            Compressor::Bzip2(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Compressor::Store(w) => w.flush(),
            Compressor::Deflate(e) => e.flush(),
            Compressor::Bzip2(e) => e.flush(),
        }
    }
}

fn random_bytes(n: usize) -> Result<Vec<u8>, Error> {
    let mut buf = vec![0u8; n];
    getrandom::getrandom(&mut buf).map_err(|e| Error::IO(io::Error::other(e)))?;
    Ok(buf)
}
