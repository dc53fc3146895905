//! Serializes an [Archive] out to a byte sink (section 4.H): local headers,
//! streaming compress+encrypt pipelines, data descriptors, central directory
//! records, and the Zip64/regular end-of-central-directory trailer.
//!
//! Every entry is mutated in place with its final offset, sizes, CRC,
//! version and extras as it's written, so the archive reflects exactly what
//! landed on the sink afterward -- this is what lets
//! [crate::ZipArchive::rewrite] simply re-read the bytes it just wrote.

use std::io::{self, Read, Write};

use tracing::instrument;

use crate::crypto::EncryptionMethod;
use crate::encoding::Encoding;
use crate::error::Error;
use crate::model::{Archive, DataSource, Entry};
use crate::parse::{
    CentralDirectoryFileHeader, DataDescriptorRecord, EndOfCentralDirectory64Locator,
    EndOfCentralDirectory64Record, EndOfCentralDirectoryRecord, ExtraField, ExtraWinZipAesField,
    ExtraZip64Field, HostSystem, LocalFileHeaderRecord, Method, MsdosTimestamp, Version,
};
use crate::pipeline::{open_entry_reader, EntryReader, EntryWriter};

/// Options controlling how an archive is serialized.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Chunk size, in bytes, used when streaming an entry's content through
    /// the compress/encrypt pipeline. Section 5 recommends 8 KiB so memory
    /// use stays independent of entry size.
    pub chunk_size: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024,
        }
    }
}

/// Arbitrary, otherwise-unused extra field id used to pad a local header so
/// an entry's data lands on an aligned boundary (section 4.H step 2).
const ALIGNMENT_FILLER_TAG: u16 = 0xd935;

/// A field value strictly greater than this needs to be promoted to Zip64.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFE;

fn needs_zip64(value: u64) -> bool {
    value > ZIP64_THRESHOLD
}

/// Writes `archive` to `sink`. Every entry is updated in place with its
/// final on-disk state (section 4.H).
#[instrument(skip_all)]
pub fn write_archive<W: Write>(
    archive: &mut Archive,
    mut sink: W,
    options: &WriterOptions,
) -> Result<(), Error> {
    let alignment = archive.alignment();
    let chunk_size = options.chunk_size.max(1);

    let mut offset = 0u64;
    for entry in archive.entries_mut() {
        offset += write_entry(entry, &mut sink, offset, alignment, chunk_size)?;
    }
    let cd_offset = offset;

    let mut cd_size = 0u64;
    let mut any_entry_zip64 = false;
    let mut max_version_needed = 20u8;
    for entry in archive.entries() {
        if entry
            .cd_extras()
            .iter()
            .any(|ef| matches!(ef, ExtraField::Zip64(_)))
        {
            any_entry_zip64 = true;
        }
        max_version_needed = max_version_needed.max(entry_version_needed_number(entry));

        let header = build_cd_header(entry);
        let bytes = header.encode();
        cd_size += bytes.len() as u64;
        sink.write_all(&bytes)?;
    }

    let entry_count = archive.len() as u64;
    let needs_zip64_eocd =
        entry_count >= 0xFFFF || needs_zip64(cd_size) || needs_zip64(cd_offset) || any_entry_zip64;

    if needs_zip64_eocd {
        let made_by = pack_version(Version {
            host_system: HostSystem::Unix,
            version: max_version_needed.max(45),
        });
        let needed = pack_version(Version {
            host_system: HostSystem::Unix,
            version: max_version_needed,
        });
        let record = EndOfCentralDirectory64Record {
            record_size: 44,
            creator_version: made_by,
            reader_version: needed,
            disk_nbr: 0,
            dir_disk_nbr: 0,
            dir_records_this_disk: entry_count,
            directory_records: entry_count,
            directory_size: cd_size,
            directory_offset: cd_offset,
        };
        sink.write_all(&record.encode())?;

        let locator = EndOfCentralDirectory64Locator {
            dir_disk_number: 0,
            directory_offset: cd_offset + cd_size,
            total_disks: 1,
        };
        sink.write_all(&locator.encode())?;
    }

    let eocd = EndOfCentralDirectoryRecord {
        disk_nbr: 0,
        dir_disk_nbr: 0,
        dir_records_this_disk: if entry_count >= 0xFFFF {
            0xFFFF
        } else {
            entry_count as u16
        },
        directory_records: if entry_count >= 0xFFFF {
            0xFFFF
        } else {
            entry_count as u16
        },
        directory_size: if needs_zip64(cd_size) {
            u32::MAX
        } else {
            cd_size as u32
        },
        directory_offset: if needs_zip64(cd_offset) {
            u32::MAX
        } else {
            cd_offset as u32
        },
        comment: archive.comment().map(|c| c.as_bytes().to_vec()).unwrap_or_default(),
    };
    sink.write_all(&eocd.encode())?;

    Ok(())
}

/// `EndOfCentralDirectory64Record`'s `creator_version`/`reader_version` are
/// raw `u16`s rather than a split host-system/version pair; pack them the
/// same way every other version field in this crate is packed on the wire
/// (low byte host system, high byte version number).
fn pack_version(v: Version) -> u16 {
    ((v.version as u16) << 8) | (u8::from(v.host_system) as u16)
}

fn entry_version_needed_number(entry: &Entry) -> u8 {
    entry.version_needed().version
}

fn aes_strength(method: EncryptionMethod) -> u8 {
    match method {
        EncryptionMethod::WinZipAes128 => 1,
        EncryptionMethod::WinZipAes192 => 2,
        EncryptionMethod::WinZipAes256 => 3,
        _ => 3,
    }
}

/// Buckets a DEFLATE compression level into gpbf bits 1-2 (section 3: bit1 =
/// maximum, bit2 = fast, both = superfast, neither = normal).
fn deflate_gpbf_bits(level: i32) -> u16 {
    match level {
        9 => 0x02,
        1 => 0x04,
        0 => 0x06,
        _ => 0x00,
    }
}

fn compute_version_needed_num(method: Method, is_aes: bool, is_zip64: bool) -> u8 {
    let mut v = 20u8;
    if is_aes {
        v = v.max(51);
    }
    if matches!(method, Method::Bzip2) {
        v = v.max(46);
    }
    if is_zip64 {
        v = v.max(45);
    }
    v
}

/// Whether this extra field is one the writer synthesizes fresh every save
/// (Zip64, WinZip AES, the alignment filler) rather than one whose bytes
/// pass through from whatever metadata the entry already carries.
fn is_synthetic_extra(ef: &ExtraField) -> bool {
    matches!(ef, ExtraField::Zip64(_))
        || matches!(ef, ExtraField::WinZipAes(_))
        || matches!(ef, ExtraField::Unknown { tag, .. } if *tag == ALIGNMENT_FILLER_TAG)
}

fn base_extras(entry: &Entry) -> Vec<ExtraField> {
    entry
        .cd_extras()
        .iter()
        .filter(|ef| !is_synthetic_extra(ef))
        .cloned()
        .collect()
}

/// Pads `local_extra` with an opaque filler record so that `data_offset_before
/// + filler.len()` is a multiple of `alignment` (section 4.H step 2). A
/// no-op when `alignment` is 0 or the offset is already aligned. The minimum
/// valid extra-field record is 4 bytes (tag + length), so a 1-3 byte
/// shortfall is padded out by a full extra `alignment` bytes instead.
fn alignment_filler(data_offset_before: u64, alignment: u32) -> Vec<u8> {
    if alignment == 0 {
        return Vec::new();
    }
    let alignment = alignment as u64;
    let remainder = data_offset_before % alignment;
    if remainder == 0 {
        return Vec::new();
    }
    let mut filler_len = alignment - remainder;
    if filler_len < 4 {
        filler_len += alignment;
    }
    let payload_len = (filler_len - 4) as usize;
    let mut out = Vec::with_capacity(filler_len as usize);
    out.extend_from_slice(&ALIGNMENT_FILLER_TAG.to_le_bytes());
    out.extend_from_slice(&(payload_len as u16).to_le_bytes());
    out.resize(out.len() + payload_len, 0);
    out
}

fn copy_stream<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
) -> io::Result<()> {
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
    }
    Ok(())
}

/// Plaintext source feeding the compress+encrypt pipeline for a recoded
/// entry: either a fresh decode of an existing [DataSource::Backed] payload,
/// or the entry's own pending bytes/file/stream.
enum PlainSource<'a> {
    Decoded(EntryReader<'a>),
    Owned(Box<dyn Read + Send>),
}

impl Read for PlainSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlainSource::Decoded(r) => r.read(buf),
            PlainSource::Owned(r) => r.read(buf),
        }
    }
}

fn plaintext_source<'a>(entry: &'a mut Entry) -> Result<PlainSource<'a>, Error> {
    if matches!(entry.data(), DataSource::Backed { .. }) {
        let read_password = entry.read_password().map(String::from);
        let reader = open_entry_reader(&*entry, read_password.as_deref())?;
        Ok(PlainSource::Decoded(reader))
    } else {
        Ok(PlainSource::Owned(entry.data_mut().take_reader()))
    }
}

/// Writes one entry's local header, data, and (if recoded) data descriptor,
/// then finalizes its central-directory extras/version. Returns the number
/// of bytes written for this entry, so the caller can track the next
/// entry's offset without a second pass over the sink.
fn write_entry<W: Write>(
    entry: &mut Entry,
    sink: &mut W,
    offset: u64,
    alignment: u32,
    chunk_size: usize,
) -> Result<u64, Error> {
    entry.set_local_header_offset(offset);

    let is_aes = matches!(
        entry.encryption_method(),
        EncryptionMethod::WinZipAes128 | EncryptionMethod::WinZipAes192 | EncryptionMethod::WinZipAes256
    );
    let real_method = entry.compression_method();
    let on_disk_method = if is_aes { Method::Aex } else { real_method };

    let copy_through = matches!(entry.data(), DataSource::Backed { .. }) && !entry.needs_recode();
    let write_known = (copy_through || entry.is_directory()) && !entry.needs_recode();

    let encoding = entry.charset().unwrap_or(Encoding::Utf8);
    let name_bytes = encoding.encode(entry.name())?;
    let comment_bytes = match entry.comment() {
        Some(c) => encoding.encode(c)?,
        None => Vec::new(),
    };
    let utf8_flag = matches!(encoding, Encoding::Utf8)
        && (!entry.name().is_ascii() || entry.comment().is_some_and(|c| !c.is_ascii()));

    let mut gpbf = 0u16;
    if entry.encryption_method().is_encrypted() {
        gpbf |= 0x1;
    }
    if matches!(real_method, Method::Deflate) {
        gpbf |= deflate_gpbf_bits(entry.compression_level());
    }
    if !write_known {
        gpbf |= 0x8;
    }
    if utf8_flag {
        gpbf |= 0x800;
    }
    entry.set_gpbf_raw(gpbf);

    let base = base_extras(entry);
    let winzip_field = if is_aes {
        let strength = aes_strength(entry.encryption_method());
        let fresh = ExtraWinZipAesField {
            version: 2,
            strength,
            method: u16::from(real_method),
        };
        let field = if copy_through {
            entry
                .cd_extras()
                .iter()
                .find_map(|ef| match ef {
                    ExtraField::WinZipAes(a) => Some(*a),
                    _ => None,
                })
                .unwrap_or(fresh)
        } else {
            fresh
        };
        Some(field)
    } else {
        None
    };
    // AE-2 (the only version this crate writes) stores a zero CRC-32 in the
    // local header, data descriptor, and central directory record, relying
    // on the HMAC-SHA1 authentication tag instead (APPNOTE Appendix E).
    let aes_v2 = winzip_field.is_some_and(|w| w.version == 2);

    let mut common_extra = Vec::new();
    for ef in &base {
        common_extra.extend_from_slice(&ef.encode());
    }
    if let Some(w) = winzip_field {
        common_extra.extend_from_slice(&ExtraField::WinZipAes(w).encode());
    }

    let modified = MsdosTimestamp::from_datetime(entry.get_mtime());
    // Per APPNOTE 6.1.3 the ZipCrypto header's last byte should be the high
    // byte of the entry's CRC-32, but that isn't known until the data is
    // fully streamed; this crate uses the high byte of the packed DOS
    // modification time instead (see DESIGN.md).
    let check_byte = (modified.date >> 8) as u8;

    let total_len;

    if write_known {
        let crc32 = if aes_v2 { 0 } else { entry.crc32().unwrap_or(0) };
        let compressed_size = entry.compressed_size().unwrap_or(0);
        let uncompressed_size = entry.uncompressed_size().unwrap_or(0);
        let is_zip64_local = needs_zip64(compressed_size) || needs_zip64(uncompressed_size);

        let mut local_extra = common_extra.clone();
        if is_zip64_local {
            let z64 = ExtraZip64Field {
                uncompressed_size,
                compressed_size,
                header_offset: 0,
                disk_start: None,
            };
            local_extra.extend_from_slice(&z64.encode_local_record());
        }
        if matches!(real_method, Method::Store) {
            let data_offset_before = offset + 30 + name_bytes.len() as u64 + local_extra.len() as u64;
            local_extra.extend_from_slice(&alignment_filler(data_offset_before, alignment));
        }

        let reader_version = Version {
            host_system: entry.version_needed().host_system,
            version: compute_version_needed_num(real_method, is_aes, is_zip64_local),
        };

        let header_bytes = LocalFileHeaderRecord::encode(
            reader_version,
            gpbf,
            on_disk_method,
            modified,
            crc32,
            if is_zip64_local { u32::MAX } else { compressed_size as u32 },
            if is_zip64_local { u32::MAX } else { uncompressed_size as u32 },
            &name_bytes,
            &local_extra,
        );
        sink.write_all(&header_bytes)?;

        let mut reader = entry.data().open()?;
        copy_stream(&mut *reader, sink, chunk_size)?;

        total_len = header_bytes.len() as u64 + compressed_size;
    } else {
        let mut local_extra = common_extra.clone();
        if matches!(real_method, Method::Store) {
            let data_offset_before = offset + 30 + name_bytes.len() as u64 + local_extra.len() as u64;
            local_extra.extend_from_slice(&alignment_filler(data_offset_before, alignment));
        }

        let reader_version = Version {
            host_system: entry.version_needed().host_system,
            version: compute_version_needed_num(real_method, is_aes, false),
        };

        let header_bytes = LocalFileHeaderRecord::encode(
            reader_version,
            gpbf,
            on_disk_method,
            modified,
            0,
            0,
            0,
            &name_bytes,
            &local_extra,
        );
        sink.write_all(&header_bytes)?;

        let password = entry.password().map(String::from);
        let encryption_method = entry.encryption_method();
        let compression_level = entry.compression_level();

        let mut source = plaintext_source(entry)?;
        let mut writer = EntryWriter::new(
            &mut *sink,
            real_method,
            encryption_method,
            password.as_deref(),
            check_byte,
            compression_level,
        )?;
        copy_stream(&mut source, &mut writer, chunk_size)?;
        drop(source);
        let (_, outcome) = writer.finish()?;

        let is_zip64_dd = needs_zip64(outcome.compressed_size) || needs_zip64(outcome.uncompressed_size);
        let dd = DataDescriptorRecord {
            crc32: if aes_v2 { 0 } else { outcome.crc32 },
            compressed_size: outcome.compressed_size,
            uncompressed_size: outcome.uncompressed_size,
        };
        let dd_bytes = dd.encode(is_zip64_dd);
        sink.write_all(&dd_bytes)?;

        entry.set_crc32(outcome.crc32);
        entry.set_resolved_sizes(outcome.uncompressed_size, outcome.compressed_size);

        total_len = header_bytes.len() as u64 + outcome.compressed_size + dd_bytes.len() as u64;
    }

    let _ = comment_bytes; // carried via entry.comment(); kept here for symmetry with build_cd_header
    finalize_entry_cd(entry, base, winzip_field, real_method, is_aes);

    Ok(total_len)
}

fn finalize_entry_cd(
    entry: &mut Entry,
    base: Vec<ExtraField>,
    winzip_field: Option<ExtraWinZipAesField>,
    real_method: Method,
    is_aes: bool,
) {
    let compressed_size = entry.compressed_size().unwrap_or(0);
    let uncompressed_size = entry.uncompressed_size().unwrap_or(0);
    let header_offset = entry.local_header_offset();
    let is_zip64 =
        needs_zip64(compressed_size) || needs_zip64(uncompressed_size) || needs_zip64(header_offset);

    let mut cd_extras = base;
    if let Some(w) = winzip_field {
        cd_extras.push(ExtraField::WinZipAes(w));
    }
    if is_zip64 {
        cd_extras.push(ExtraField::Zip64(ExtraZip64Field {
            uncompressed_size,
            compressed_size,
            header_offset,
            disk_start: Some(0),
        }));
    }
    entry.set_cd_extras(cd_extras);

    let version_needed_num = compute_version_needed_num(real_method, is_aes, is_zip64);
    let made_by = Version {
        host_system: entry.version_made_by().host_system,
        version: version_needed_num.max(45),
    };
    let needed = Version {
        host_system: entry.version_needed().host_system,
        version: version_needed_num,
    };
    entry.set_version(made_by, needed);
}

fn external_attrs_for(entry: &Entry, host_system: HostSystem) -> u32 {
    match host_system {
        HostSystem::Unix | HostSystem::Osx => entry.mode_raw().to_unix_mode() << 16,
        _ => {
            let mut attrs = 0u32;
            if entry.is_directory() {
                attrs |= 0x10;
            }
            if entry.mode_raw().permissions() & 0o200 == 0 {
                attrs |= 0x01;
            }
            attrs
        }
    }
}

fn build_cd_header(entry: &Entry) -> CentralDirectoryFileHeader {
    let is_aes = matches!(
        entry.encryption_method(),
        EncryptionMethod::WinZipAes128 | EncryptionMethod::WinZipAes192 | EncryptionMethod::WinZipAes256
    );
    let method = if is_aes { Method::Aex } else { entry.compression_method() };
    let aes_v2 = is_aes
        && entry.cd_extras().iter().any(
            |ef| matches!(ef, ExtraField::WinZipAes(a) if a.version == 2),
        );

    let encoding = entry.charset().unwrap_or(Encoding::Utf8);
    let name = encoding
        .encode(entry.name())
        .unwrap_or_else(|_| entry.name().as_bytes().to_vec());
    let comment = match entry.comment() {
        Some(c) => encoding.encode(c).unwrap_or_else(|_| c.as_bytes().to_vec()),
        None => Vec::new(),
    };

    let compressed_size = entry.compressed_size().unwrap_or(0);
    let uncompressed_size = entry.uncompressed_size().unwrap_or(0);
    let header_offset = entry.local_header_offset();
    let is_zip64 = entry
        .cd_extras()
        .iter()
        .any(|ef| matches!(ef, ExtraField::Zip64(_)));

    let mut extra = Vec::new();
    for ef in entry.cd_extras() {
        extra.extend_from_slice(&ef.encode());
    }

    let host_system = entry.version_made_by().host_system;
    let external_attrs = external_attrs_for(entry, host_system);

    CentralDirectoryFileHeader {
        creator_version: entry.version_made_by(),
        reader_version: entry.version_needed(),
        flags: entry.gpbf(),
        method,
        modified: MsdosTimestamp::from_datetime(entry.get_mtime()),
        crc32: if aes_v2 { 0 } else { entry.crc32().unwrap_or(0) },
        compressed_size: if is_zip64 { u32::MAX } else { compressed_size as u32 },
        uncompressed_size: if is_zip64 { u32::MAX } else { uncompressed_size as u32 },
        disk_nbr_start: 0,
        internal_attrs: entry.internal_attr(),
        external_attrs,
        header_offset: if is_zip64 { u32::MAX } else { header_offset as u32 },
        name,
        extra,
        comment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn needs_zip64_is_false_at_the_threshold() {
        assert!(!needs_zip64(ZIP64_THRESHOLD));
        assert!(needs_zip64(ZIP64_THRESHOLD + 1));
    }

    #[test]
    fn alignment_filler_is_empty_when_disabled_or_already_aligned() {
        assert_eq!(alignment_filler(123, 0), Vec::<u8>::new());
        assert_eq!(alignment_filler(16, 4), Vec::<u8>::new());
    }

    #[test]
    fn alignment_filler_pads_to_the_next_boundary() {
        let filler = alignment_filler(17, 4);
        // offset 17 + filler lands on the next multiple of 4
        assert_eq!((17 + filler.len() as u64) % 4, 0);
        // tag + length header, both little-endian
        assert_eq!(&filler[0..2], &ALIGNMENT_FILLER_TAG.to_le_bytes());
        let payload_len = u16::from_le_bytes([filler[2], filler[3]]) as usize;
        assert_eq!(filler.len(), 4 + payload_len);
    }

    #[test]
    fn alignment_filler_never_yields_a_record_shorter_than_four_bytes() {
        // a 1-byte shortfall can't fit a valid 4-byte-minimum extra record,
        // so the filler rolls over to a full extra `alignment` bytes.
        for offset in 0u64..64 {
            let filler = alignment_filler(offset, 4);
            assert!(filler.is_empty() || filler.len() >= 4);
        }
    }
}
