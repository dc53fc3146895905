//! WinZip AES encryption (APPNOTE Appendix E, "AE-x" extra field).
//!
//! Unlike [ZipCrypto][super::zipcrypto], this scheme derives its keys
//! properly: PBKDF2-HMAC-SHA1 stretches the password and a random salt into
//! an AES key, an HMAC-SHA1 key, and a 2-byte password verifier. The
//! ciphertext itself is AES in CTR mode with a little-endian 128-bit counter
//! that starts at 1, followed by a 10-byte truncated HMAC-SHA1 authentication
//! code over the ciphertext.

use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;
type Ctr128LeAes128 = ctr::Ctr128LE<Aes128>;
type Ctr128LeAes192 = ctr::Ctr128LE<Aes192>;
type Ctr128LeAes256 = ctr::Ctr128LE<Aes256>;

/// Length, in bytes, of the truncated HMAC-SHA1 authentication code that
/// follows the ciphertext.
pub const AES_AUTH_CODE_LEN: usize = 10;

const PBKDF2_ROUNDS: u32 = 1000;
const VERIFIER_LEN: usize = 2;

/// AES key size used by a WinZip AES entry, as recorded in its AE-x extra
/// field's "strength" byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    /// 128-bit AES key, 8-byte salt.
    Aes128,
    /// 192-bit AES key, 12-byte salt.
    Aes192,
    /// 256-bit AES key, 16-byte salt.
    Aes256,
}

impl KeySize {
    /// Number of bytes in the AES key (and the HMAC key, which is the same size).
    pub fn key_len(self) -> usize {
        match self {
            KeySize::Aes128 => 16,
            KeySize::Aes192 => 24,
            KeySize::Aes256 => 32,
        }
    }

    /// Number of bytes in the random salt that precedes the ciphertext.
    pub fn salt_len(self) -> usize {
        self.key_len() / 2
    }
}

enum AesCtr {
    Aes128(Ctr128LeAes128),
    Aes192(Ctr128LeAes192),
    Aes256(Ctr128LeAes256),
}

impl AesCtr {
    fn new(key_size: KeySize, key: &[u8]) -> Self {
        // little-endian 128-bit counter, starting at 1 (APPNOTE App. E, note 4)
        let mut iv = [0u8; 16];
        iv[0] = 1;
        match key_size {
            KeySize::Aes128 => Self::Aes128(Ctr128LeAes128::new(key.into(), (&iv).into())),
            KeySize::Aes192 => Self::Aes192(Ctr128LeAes192::new(key.into(), (&iv).into())),
            KeySize::Aes256 => Self::Aes256(Ctr128LeAes256::new(key.into(), (&iv).into())),
        }
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            AesCtr::Aes128(c) => c.apply_keystream(buf),
            AesCtr::Aes192(c) => c.apply_keystream(buf),
            AesCtr::Aes256(c) => c.apply_keystream(buf),
        }
    }
}

struct DerivedKeys {
    aes_key: Vec<u8>,
    hmac_key: Vec<u8>,
    verifier: [u8; VERIFIER_LEN],
}

fn derive(password: &[u8], salt: &[u8], key_size: KeySize) -> DerivedKeys {
    let n = key_size.key_len();
    let mut out = vec![0u8; 2 * n + VERIFIER_LEN];
    pbkdf2::pbkdf2_hmac::<Sha1>(password, salt, PBKDF2_ROUNDS, &mut out);
    let mut verifier = [0u8; VERIFIER_LEN];
    verifier.copy_from_slice(&out[2 * n..2 * n + VERIFIER_LEN]);
    DerivedKeys {
        aes_key: out[..n].to_vec(),
        hmac_key: out[n..2 * n].to_vec(),
        verifier,
    }
}

/// Streaming decryptor for a WinZip AES-protected entry.
pub struct WinZipAesDecryptor {
    ctr: AesCtr,
    mac: HmacSha1,
}

impl WinZipAesDecryptor {
    /// Derives keys from `password` and `salt`, and checks `verifier` (the
    /// 2 bytes immediately following the salt) against the derived password
    /// verifier. Returns `None` if the password is wrong.
    ///
    /// The caller must separately feed the ciphertext through [Self::update]
    /// and compare the final [Self::finish] tag against the 10 trailing
    /// authentication bytes.
    pub fn new(
        password: &[u8],
        key_size: KeySize,
        salt: &[u8],
        verifier: [u8; VERIFIER_LEN],
    ) -> Option<Self> {
        let keys = derive(password, salt, key_size);
        if keys.verifier != verifier {
            return None;
        }
        let ctr = AesCtr::new(key_size, &keys.aes_key);
        let mac = HmacSha1::new_from_slice(&keys.hmac_key).expect("HMAC accepts any key length");
        Some(Self { ctr, mac })
    }

    /// Decrypts `buf` in place and feeds the (still-)ciphertext bytes into
    /// the running HMAC. Must be called with the ciphertext in order, before
    /// decryption, i.e. pass the bytes as read from the archive.
    pub fn update(&mut self, buf: &mut [u8]) {
        self.mac.update(buf);
        self.ctr.apply_keystream(buf);
    }

    /// Finalizes the HMAC and returns the computed 10-byte authentication
    /// code, to be compared (in constant time) against the trailing bytes of
    /// the entry's compressed data.
    pub fn finish(self) -> [u8; AES_AUTH_CODE_LEN] {
        let tag = self.mac.finalize().into_bytes();
        let mut out = [0u8; AES_AUTH_CODE_LEN];
        out.copy_from_slice(&tag[..AES_AUTH_CODE_LEN]);
        out
    }
}

/// Streaming encryptor for a WinZip AES-protected entry.
pub struct WinZipAesEncryptor {
    ctr: AesCtr,
    mac: HmacSha1,
}

impl WinZipAesEncryptor {
    /// Derives keys from `password` and `salt` (which the caller must have
    /// generated from a CSPRNG and written to the archive ahead of the
    /// ciphertext) and returns the encryptor plus the 2-byte password
    /// verifier to write right after the salt.
    pub fn new(password: &[u8], key_size: KeySize, salt: &[u8]) -> (Self, [u8; VERIFIER_LEN]) {
        let keys = derive(password, salt, key_size);
        let ctr = AesCtr::new(key_size, &keys.aes_key);
        let mac = HmacSha1::new_from_slice(&keys.hmac_key).expect("HMAC accepts any key length");
        (Self { ctr, mac }, keys.verifier)
    }

    /// Encrypts `buf` in place and feeds the ciphertext into the running HMAC.
    pub fn update(&mut self, buf: &mut [u8]) {
        self.ctr.apply_keystream(buf);
        self.mac.update(buf);
    }

    /// Finalizes the HMAC, returning the 10-byte authentication code to
    /// append after the ciphertext.
    pub fn finish(self) -> [u8; AES_AUTH_CODE_LEN] {
        let tag = self.mac.finalize().into_bytes();
        let mut out = [0u8; AES_AUTH_CODE_LEN];
        out.copy_from_slice(&tag[..AES_AUTH_CODE_LEN]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic_for_same_inputs() {
        let salt = [9u8; 16];
        let a = derive(b"hunter2", &salt, KeySize::Aes256);
        let b = derive(b"hunter2", &salt, KeySize::Aes256);
        assert_eq!(a.aes_key, b.aes_key);
        assert_eq!(a.hmac_key, b.hmac_key);
        assert_eq!(a.verifier, b.verifier);
    }

    #[test]
    fn encrypt_then_decrypt_round_trips_with_matching_tag() {
        for key_size in [KeySize::Aes128, KeySize::Aes192, KeySize::Aes256] {
            let salt = vec![0x5au8; key_size.salt_len()];
            let plaintext = b"the five boxing wizards jump quickly";

            let (mut encryptor, verifier) =
                WinZipAesEncryptor::new(b"correct horse battery staple", key_size, &salt);
            let mut ciphertext = plaintext.to_vec();
            encryptor.update(&mut ciphertext);
            let tag = encryptor.finish();

            let mut decryptor = WinZipAesDecryptor::new(
                b"correct horse battery staple",
                key_size,
                &salt,
                verifier,
            )
            .unwrap();
            let mut recovered = ciphertext.clone();
            decryptor.update(&mut recovered);
            assert_eq!(decryptor.finish(), tag);
            assert_eq!(recovered, plaintext);
        }
    }

    #[test]
    fn wrong_password_fails_verifier_check() {
        let salt = [3u8; 16];
        let (_, verifier) = WinZipAesEncryptor::new(b"right", KeySize::Aes256, &salt);
        assert!(WinZipAesDecryptor::new(b"wrong", KeySize::Aes256, &salt, verifier).is_none());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let salt = [1u8; 8];
        let plaintext = b"authenticate me please";
        let (mut encryptor, verifier) = WinZipAesEncryptor::new(b"pw", KeySize::Aes128, &salt);
        let mut ciphertext = plaintext.to_vec();
        encryptor.update(&mut ciphertext);
        let tag = encryptor.finish();

        ciphertext[0] ^= 0xff;
        let mut decryptor =
            WinZipAesDecryptor::new(b"pw", KeySize::Aes128, &salt, verifier).unwrap();
        let mut recovered = ciphertext.clone();
        decryptor.update(&mut recovered);
        assert_ne!(decryptor.finish(), tag);
    }
}
