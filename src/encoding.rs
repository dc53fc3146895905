//! Character encodings used in ZIP files.
//!
//! ZIP entry paths may be encoded in a variety of character encodings:
//! historically, CP-437 was used, but many modern zip files use UTF-8 with an
//! optional UTF-8 flag.
//!
//! Others use the system's local character encoding, and we have no choice but
//! to make an educated guess thanks to the chardet-ng crate.

use std::fmt;

/// Encodings supported by this crate for decoding entry names and comments.
///
/// [Encoding::Utf8] and [Encoding::Cp437] are auto-detected (see
/// [is_entry_non_utf8]); the rest are only used when a caller explicitly asks
/// for them via `ReaderOptions::read_charset` or `Entry::set_charset`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Encoding {
    /// [UTF-8](https://en.wikipedia.org/wiki/UTF-8), opt-in for ZIP files.
    Utf8,

    /// [Codepage 437](https://en.wikipedia.org/wiki/Code_page_437), also known as
    /// OEM-US, PC-8, or DOS Latin US.
    ///
    /// This is the fallback if UTF-8 is not specified and no other encoding
    /// is auto-detected. It was the original encoding of the zip format.
    Cp437,

    /// [Codepage 850](https://en.wikipedia.org/wiki/Code_page_850), "Multilingual (Latin-1)".
    Cp850,

    /// [Codepage 852](https://en.wikipedia.org/wiki/Code_page_852), "Latin-2" (Central European).
    Cp852,

    /// [Codepage 866](https://en.wikipedia.org/wiki/Code_page_866), DOS Cyrillic.
    Cp866,

    /// Windows-1250, Central European.
    Cp1250,

    /// Windows-1251, Cyrillic.
    Cp1251,

    /// Windows-1252, Western European (superset of Latin-1).
    Cp1252,

    /// Windows-1253, Greek.
    Cp1253,

    /// Windows-1254, Turkish.
    Cp1254,

    /// Windows-1255, Hebrew.
    Cp1255,

    /// Windows-1256, Arabic.
    Cp1256,

    /// Windows-1257, Baltic.
    Cp1257,

    /// Windows-1258, Vietnamese.
    Cp1258,

    /// [KOI8-R](https://en.wikipedia.org/wiki/KOI8-R), Russian.
    Koi8R,

    /// [Mac OS Roman](https://en.wikipedia.org/wiki/Mac_OS_Roman), classic Macintosh encoding.
    MacRoman,

    /// [Shift JIS](https://en.wikipedia.org/wiki/Shift_JIS), also known as SJIS.
    ///
    /// Still in use by some Japanese users as of 2019.
    ShiftJis,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Encoding as T;
        match self {
            T::Utf8 => write!(f, "utf-8"),
            T::Cp437 => write!(f, "cp-437"),
            T::Cp850 => write!(f, "cp-850"),
            T::Cp852 => write!(f, "cp-852"),
            T::Cp866 => write!(f, "cp-866"),
            T::Cp1250 => write!(f, "windows-1250"),
            T::Cp1251 => write!(f, "windows-1251"),
            T::Cp1252 => write!(f, "windows-1252"),
            T::Cp1253 => write!(f, "windows-1253"),
            T::Cp1254 => write!(f, "windows-1254"),
            T::Cp1255 => write!(f, "windows-1255"),
            T::Cp1256 => write!(f, "windows-1256"),
            T::Cp1257 => write!(f, "windows-1257"),
            T::Cp1258 => write!(f, "windows-1258"),
            T::Koi8R => write!(f, "koi8-r"),
            T::MacRoman => write!(f, "mac-roman"),
            T::ShiftJis => write!(f, "shift-jis"),
        }
    }
}

/// Errors encountered while converting text to UTF-8.
#[derive(Debug)]
pub enum DecodingError {
    /// Text claimed to be UTF-8, but wasn't (as far as we can tell).
    Utf8Error(std::str::Utf8Error),

    /// Text is too large to be converted.
    ///
    /// In practice, this happens if the text's length is larger than
    /// [usize::MAX], which seems unlikely.
    StringTooLarge,

    /// Text is not valid in the given encoding.
    EncodingError(&'static str),
}

impl From<std::str::Utf8Error> for DecodingError {
    fn from(e: std::str::Utf8Error) -> Self {
        DecodingError::Utf8Error(e)
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utf8Error(utf8) => write!(f, "invalid utf-8: {utf8}"),
            Self::StringTooLarge => f.write_str("text too large to be converted"),
            Self::EncodingError(enc) => write!(f, "encoding error: {enc}"),
        }
    }
}

impl std::error::Error for DecodingError {}

impl Encoding {
    pub(crate) fn decode(&self, i: &[u8]) -> Result<String, DecodingError> {
        use oem_cp::code_table::*;

        match self {
            Encoding::Utf8 => {
                let s = str::from_utf8(i)?;
                Ok(s.to_string())
            }
            Encoding::Cp437 => Ok(oem_cp::decode_string_complete_table(
                i,
                &DECODING_TABLE_CP437,
            )),
            Encoding::Cp850 => Ok(oem_cp::decode_string_complete_table(
                i,
                &DECODING_TABLE_CP850,
            )),
            Encoding::Cp852 => Ok(oem_cp::decode_string_complete_table(
                i,
                &DECODING_TABLE_CP852,
            )),
            Encoding::Cp866 => Ok(oem_cp::decode_string_complete_table(
                i,
                &DECODING_TABLE_CP866,
            )),
            Encoding::Cp1250 => self.decode_as(i, encoding_rs::WINDOWS_1250),
            Encoding::Cp1251 => self.decode_as(i, encoding_rs::WINDOWS_1251),
            Encoding::Cp1252 => self.decode_as(i, encoding_rs::WINDOWS_1252),
            Encoding::Cp1253 => self.decode_as(i, encoding_rs::WINDOWS_1253),
            Encoding::Cp1254 => self.decode_as(i, encoding_rs::WINDOWS_1254),
            Encoding::Cp1255 => self.decode_as(i, encoding_rs::WINDOWS_1255),
            Encoding::Cp1256 => self.decode_as(i, encoding_rs::WINDOWS_1256),
            Encoding::Cp1257 => self.decode_as(i, encoding_rs::WINDOWS_1257),
            Encoding::Cp1258 => self.decode_as(i, encoding_rs::WINDOWS_1258),
            Encoding::Koi8R => self.decode_as(i, encoding_rs::KOI8_R),
            Encoding::MacRoman => self.decode_as(i, encoding_rs::MACINTOSH),
            Encoding::ShiftJis => self.decode_as(i, encoding_rs::SHIFT_JIS),
        }
    }

    /// Encodes `s` into this encoding's byte representation, for writing a
    /// name or comment back out. Used only when an entry has an explicit
    /// [Self] override; fresh/renamed entries are always written as UTF-8.
    pub(crate) fn encode(&self, s: &str) -> Result<Vec<u8>, DecodingError> {
        use oem_cp::code_table::*;

        match self {
            Encoding::Utf8 => Ok(s.as_bytes().to_vec()),
            Encoding::Cp437 => oem_cp::encode_string_checked(s, &ENCODING_TABLE_CP437)
                .ok_or(DecodingError::EncodingError("cp-437")),
            Encoding::Cp850 => oem_cp::encode_string_checked(s, &ENCODING_TABLE_CP850)
                .ok_or(DecodingError::EncodingError("cp-850")),
            Encoding::Cp852 => oem_cp::encode_string_checked(s, &ENCODING_TABLE_CP852)
                .ok_or(DecodingError::EncodingError("cp-852")),
            Encoding::Cp866 => oem_cp::encode_string_checked(s, &ENCODING_TABLE_CP866)
                .ok_or(DecodingError::EncodingError("cp-866")),
            Encoding::Cp1250 => self.encode_as(s, encoding_rs::WINDOWS_1250),
            Encoding::Cp1251 => self.encode_as(s, encoding_rs::WINDOWS_1251),
            Encoding::Cp1252 => self.encode_as(s, encoding_rs::WINDOWS_1252),
            Encoding::Cp1253 => self.encode_as(s, encoding_rs::WINDOWS_1253),
            Encoding::Cp1254 => self.encode_as(s, encoding_rs::WINDOWS_1254),
            Encoding::Cp1255 => self.encode_as(s, encoding_rs::WINDOWS_1255),
            Encoding::Cp1256 => self.encode_as(s, encoding_rs::WINDOWS_1256),
            Encoding::Cp1257 => self.encode_as(s, encoding_rs::WINDOWS_1257),
            Encoding::Cp1258 => self.encode_as(s, encoding_rs::WINDOWS_1258),
            Encoding::Koi8R => self.encode_as(s, encoding_rs::KOI8_R),
            Encoding::MacRoman => self.encode_as(s, encoding_rs::MACINTOSH),
            Encoding::ShiftJis => self.encode_as(s, encoding_rs::SHIFT_JIS),
        }
    }

    fn encode_as(
        &self,
        s: &str,
        encoding: &'static encoding_rs::Encoding,
    ) -> Result<Vec<u8>, DecodingError> {
        let mut encoder = encoding.new_encoder();
        let len = encoder
            .max_buffer_length_from_utf8_without_replacement(s.len())
            .ok_or(DecodingError::StringTooLarge)?;
        let mut v = vec![0u8; len];
        let (result, _read, written) = encoder.encode_from_utf8_without_replacement(s, &mut v, true);
        if result != encoding_rs::EncoderResult::InputEmpty {
            return Err(DecodingError::EncodingError(encoding.name()));
        }
        v.truncate(written);
        Ok(v)
    }

    pub(crate) fn decode_vec(&self, v: Vec<u8>) -> Result<String, DecodingError> {
        if *self == Encoding::Utf8 {
            String::from_utf8(v).map_err(|e| e.utf8_error().into())
        } else {
            self.decode(&v)
        }
    }

    fn decode_as(
        &self,
        i: &[u8],
        encoding: &'static encoding_rs::Encoding,
    ) -> Result<String, DecodingError> {
        let mut decoder = encoding.new_decoder();
        let len = decoder
            .max_utf8_buffer_length(i.len())
            .ok_or(DecodingError::StringTooLarge)?;
        let mut v = vec![0u8; len];
        let last = true;
        let (_decoder_result, _decoder_read, decoder_written, had_errors) =
            decoder.decode_to_utf8(i, &mut v, last);
        if had_errors {
            return Err(DecodingError::EncodingError(encoding.name()));
        }
        v.resize(decoder_written, 0u8);
        Ok(unsafe { String::from_utf8_unchecked(v) })
    }
}

pub(crate) fn is_entry_non_utf8(name: &[u8], comment: &[u8], flags: u16) -> bool {
    let (valid1, require1) = detect_utf8(name);
    let (valid2, require2) = detect_utf8(comment);
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
    flags & 0x800 == 0
}

/// Guess the character encoding used by a batch of non-UTF-8 entry names and
/// comments, feeding at most a few KiB into `chardetng` before giving up and
/// defaulting to CP-437.
///
/// `chardetng` sometimes mistakes CP-437 box-drawing bytes (0xB0-0xDF) for
/// Shift-JIS; `had_suspicious_chars_for_cp437` disambiguates the two by
/// checking whether any byte in that range showed up at all.
pub(crate) fn detect_encoding<'a>(fields: impl Iterator<Item = &'a [u8]>) -> Encoding {
    let mut detector = chardetng::EncodingDetector::new();
    let mut had_suspicious_chars_for_cp437 = false;

    const MAX_FEED: usize = 4096;
    let mut total_fed: usize = 0;
    for field in fields {
        if total_fed >= MAX_FEED {
            break;
        }
        detector.feed(field, false);
        for b in field {
            if (0xB0..=0xDF).contains(b) {
                had_suspicious_chars_for_cp437 = true;
            }
        }
        total_fed += field.len();
    }

    let guess = detector.guess(None, true);
    if guess == encoding_rs::SHIFT_JIS {
        if had_suspicious_chars_for_cp437 {
            Encoding::ShiftJis
        } else {
            Encoding::Cp437
        }
    } else if guess == encoding_rs::UTF_8 {
        Encoding::Utf8
    } else {
        Encoding::Cp437
    }
}

// detect_utf8 reports whether s is a valid UTF-8 string, and whether the string
// must be considered UTF-8 encoding (i.e., not compatible with CP-437, ASCII,
// or any other common encoding).
pub(crate) fn detect_utf8(input: &[u8]) -> (bool, bool) {
    match std::str::from_utf8(input) {
        Err(_) => {
            // not valid utf-8
            (false, false)
        }
        Ok(s) => {
            let mut require = false;

            // Officially, ZIP uses CP-437, but many readers use the system's
            // local character encoding. Most encoding are compatible with a large
            // subset of CP-437, which itself is ASCII-like.
            //
            // Forbid 0x7e and 0x5c since EUC-KR and Shift-JIS replace those
            // characters with localized currency and overline characters.
            for c in s.chars() {
                if c < 0x20 as char || c > 0x7d as char || c == 0x5c as char {
                    require = true
                }
            }
            (true, require)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "report_2024.txt";

    #[test]
    fn codepage_round_trip() {
        for encoding in [
            Encoding::Cp437,
            Encoding::Cp850,
            Encoding::Cp852,
            Encoding::Cp866,
            Encoding::Cp1250,
            Encoding::Cp1251,
            Encoding::Cp1252,
            Encoding::Cp1253,
            Encoding::Cp1254,
            Encoding::Cp1255,
            Encoding::Cp1256,
            Encoding::Cp1257,
            Encoding::Cp1258,
            Encoding::Koi8R,
            Encoding::MacRoman,
        ] {
            let encoded = encoding.encode(FIXTURE).unwrap();
            let decoded = encoding.decode(&encoded).unwrap();
            assert_eq!(decoded, FIXTURE, "round-trip failed for {encoding}");
        }
    }

    #[test]
    fn utf8_round_trip_non_ascii() {
        let s = "caf\u{e9}/\u{1f980}.txt";
        let encoded = Encoding::Utf8.encode(s).unwrap();
        assert_eq!(Encoding::Utf8.decode(&encoded).unwrap(), s);
    }

    #[test]
    fn is_entry_non_utf8_plain_ascii_is_utf8() {
        assert!(!is_entry_non_utf8(b"hello.txt", b"", 0));
    }

    #[test]
    fn is_entry_non_utf8_invalid_bytes_are_flagged() {
        assert!(is_entry_non_utf8(&[0xff, 0xfe, 0x00], b"", 0));
    }

    #[test]
    fn detect_encoding_defaults_to_cp437_for_high_bytes_without_sjis_markers() {
        let field: &[u8] = &[0xC5, 0xC6, 0xC7];
        let guess = detect_encoding(std::iter::once(field));
        assert_eq!(guess, Encoding::Cp437);
    }
}
