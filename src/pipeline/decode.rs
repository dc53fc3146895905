use std::io::{self, Read};

use bzip2::read::BzDecoder;
use flate2::read::DeflateDecoder;

use crate::crypto::{
    EncryptionMethod, WinZipAesDecryptor, ZipCryptoDecryptor, AES_AUTH_CODE_LEN,
};
use crate::error::Error;
use crate::model::Entry;
use crate::parse::{Method, MsdosTimestamp};

/// Opens a streaming, decrypted and decompressed reader over `entry`'s
/// data, verifying its CRC-32 (or, for WinZip AES v2 entries, its HMAC
/// authentication tag instead) once the stream is exhausted.
///
/// `password` is required if the entry is encrypted; a wrong password fails
/// fast, either on the first read (ZipCrypto, WinZip AES) via
/// [crate::error::Error::AuthenticationError].
pub fn open_entry_reader<'a>(
    entry: &'a Entry,
    password: Option<&str>,
) -> Result<EntryReader<'a>, Error> {
    let compressed_size = entry.compressed_size().unwrap_or(0);
    let raw = entry.data().open()?;

    let cipher = CipherReader::new(raw, entry, password, compressed_size)?;
    let skip_crc = matches!(entry.encryption_method(), EncryptionMethod::WinZipAes256 | EncryptionMethod::WinZipAes192 | EncryptionMethod::WinZipAes128)
        && is_aes_v2(entry);
    let decompressor = Decompressor::new(cipher, entry.compression_method())?;

    Ok(EntryReader {
        inner: decompressor,
        name: entry.name().to_string(),
        expected_crc32: entry.crc32().unwrap_or(0),
        hasher: crc32fast::Hasher::new(),
        skip_crc,
        finished: false,
    })
}

fn is_aes_v2(entry: &Entry) -> bool {
    use crate::parse::ExtraField;
    entry
        .local_extras()
        .iter()
        .chain(entry.cd_extras())
        .any(|ef| matches!(ef, ExtraField::WinZipAes(a) if a.version == 2))
}

/// The cipher layer: either a pass-through, ZipCrypto, or WinZip AES
/// decryptor wrapping the raw (still-compressed) byte source.
enum CipherReader<'a> {
    None(Box<dyn Read + 'a>),
    ZipCrypto {
        inner: Box<dyn Read + 'a>,
        cipher: ZipCryptoDecryptor,
        remaining: u64,
    },
    WinZipAes {
        inner: Box<dyn Read + 'a>,
        cipher: Option<WinZipAesDecryptor>,
        remaining: u64,
        tag_checked: bool,
        name: String,
    },
}

impl<'a> CipherReader<'a> {
    fn new(
        mut raw: Box<dyn Read + 'a>,
        entry: &Entry,
        password: Option<&str>,
        compressed_size: u64,
    ) -> Result<Self, Error> {
        match entry.encryption_method() {
            EncryptionMethod::None => Ok(CipherReader::None(raw)),
            EncryptionMethod::PkwareZipCrypto => {
                let password = password.unwrap_or("");
                let mut header = [0u8; crate::crypto::ZIPCRYPTO_HEADER_LEN];
                raw.read_exact(&mut header)?;
                // Per APPNOTE 6.1.3 the header's last byte is normally the
                // high byte of the entry's CRC-32, but when a data
                // descriptor is used (gpbf bit 3) the CRC wasn't known at
                // header-write time, so the writer stamps the high byte of
                // the packed DOS modification time instead (see writer.rs).
                let check_byte = if entry.gpbf() & 0x8 != 0 {
                    (MsdosTimestamp::from_datetime(entry.get_mtime()).date >> 8) as u8
                } else {
                    ((entry.crc32().unwrap_or(0)) >> 24) as u8
                };
                let cipher = ZipCryptoDecryptor::new(password.as_bytes(), &header, check_byte)
                    .ok_or_else(|| Error::AuthenticationError {
                        name: entry.name().to_string(),
                    })?;
                Ok(CipherReader::ZipCrypto {
                    inner: raw,
                    cipher,
                    remaining: compressed_size.saturating_sub(header.len() as u64),
                })
            }
            method @ (EncryptionMethod::WinZipAes128
            | EncryptionMethod::WinZipAes192
            | EncryptionMethod::WinZipAes256) => {
                let key_size = method.aes_key_size().expect("aes method has a key size");
                let salt_len = key_size.salt_len();
                let mut salt = vec![0u8; salt_len];
                raw.read_exact(&mut salt)?;
                let mut verifier = [0u8; 2];
                raw.read_exact(&mut verifier)?;
                let password = password.unwrap_or("");
                let cipher =
                    WinZipAesDecryptor::new(password.as_bytes(), key_size, &salt, verifier)
                        .ok_or_else(|| Error::AuthenticationError {
                            name: entry.name().to_string(),
                        })?;
                let overhead = (salt_len + 2 + AES_AUTH_CODE_LEN) as u64;
                Ok(CipherReader::WinZipAes {
                    inner: raw,
                    cipher: Some(cipher),
                    remaining: compressed_size.saturating_sub(overhead),
                    tag_checked: false,
                    name: entry.name().to_string(),
                })
            }
        }
    }
}

impl Read for CipherReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            CipherReader::None(r) => r.read(buf),
            CipherReader::ZipCrypto {
                inner,
                cipher,
                remaining,
            } => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let want = (buf.len() as u64).min(*remaining) as usize;
                let n = inner.read(&mut buf[..want])?;
                cipher.decrypt(&mut buf[..n]);
                *remaining -= n as u64;
                Ok(n)
            }
            CipherReader::WinZipAes {
                inner,
                cipher,
                remaining,
                tag_checked,
                name,
            } => {
                if *remaining == 0 {
                    if !*tag_checked {
                        *tag_checked = true;
                        let mut tag = [0u8; AES_AUTH_CODE_LEN];
                        inner.read_exact(&mut tag)?;
                        let computed = cipher.take().expect("cipher consumed once").finish();
                        if computed != tag {
                            return Err(Error::AuthenticationError { name: name.clone() }.into());
                        }
                    }
                    return Ok(0);
                }
                let want = (buf.len() as u64).min(*remaining) as usize;
                let n = inner.read(&mut buf[..want])?;
                if n == 0 {
                    return Ok(0);
                }
                cipher
                    .as_mut()
                    .expect("cipher available while data remains")
                    .update(&mut buf[..n]);
                *remaining -= n as u64;
                Ok(n)
            }
        }
    }
}

/// The decompression layer.
enum Decompressor<'a> {
    Store(CipherReader<'a>),
    Deflate(DeflateDecoder<CipherReader<'a>>),
    Bzip2(BzDecoder<CipherReader<'a>>),
}

impl<'a> Decompressor<'a> {
    fn new(cipher: CipherReader<'a>, method: Method) -> Result<Self, Error> {
        match method {
            Method::Store => Ok(Decompressor::Store(cipher)),
            Method::Deflate => Ok(Decompressor::Deflate(DeflateDecoder::new(cipher))),
            Method::Bzip2 => Ok(Decompressor::Bzip2(BzDecoder::new(cipher))),
            Method::Aex | Method::Unrecognized(_) => Err(Error::method_not_supported(method)),
        }
    }
}

impl Read for Decompressor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Store(r) => r.read(buf),
            Decompressor::Deflate(r) => r.read(buf),
            Decompressor::Bzip2(r) => r.read(buf),
        }
    }
}

/// A streaming, decrypted and decompressed reader over a single entry's
/// data, returned by [crate::ZipArchive::open_entry]/[open_entry_reader].
///
/// CRC-32 (or, for WinZip AES v2, the HMAC authentication tag) is verified
/// once the underlying stream reports EOF; a mismatch surfaces as an
/// `io::Error` wrapping [crate::error::Error::Crc32Mismatch] or
/// [crate::error::Error::AuthenticationError] from the read call that first
/// observes it.
pub struct EntryReader<'a> {
    inner: Decompressor<'a>,
    name: String,
    expected_crc32: u32,
    hasher: crc32fast::Hasher,
    skip_crc: bool,
    finished: bool,
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n == 0 {
            self.finished = true;
            if !self.skip_crc {
                let actual = self.hasher.clone().finalize();
                if actual != self.expected_crc32 {
                    return Err(Error::Crc32Mismatch {
                        name: self.name.clone(),
                        expected: self.expected_crc32,
                        actual,
                    }
                    .into());
                }
            }
            return Ok(0);
        }
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}
