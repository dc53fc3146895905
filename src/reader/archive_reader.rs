use std::sync::Arc;

use tracing::{instrument, trace};

use crate::encoding::{detect_encoding, is_entry_non_utf8, Encoding};
use crate::error::{Error, FormatError, UnsupportedError};
use crate::model::Archive;
use crate::parse::{
    CentralDirectoryFileHeader, EndOfCentralDirectory, EndOfCentralDirectory64Locator,
    EndOfCentralDirectory64Record, EndOfCentralDirectoryRecord, Located,
};
use crate::source::Source;

use super::local_header::confirm_local_header;

use winnow::{Parser, Partial};

/// Options controlling how an archive is read.
#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Force a specific character encoding for entry names/comments, instead
    /// of auto-detecting one.
    pub charset: Option<Encoding>,
}

/// Largest comment an end-of-central-directory record can carry, which bounds
/// how far back we need to scan to find it.
const MAX_EOCD_COMMENT_SIZE: u64 = u16::MAX as u64;
const EOCD_RECORD_MIN_SIZE: u64 = 22;

/// Reads the central directory of a zip archive (section 4.F, steps 1-4).
#[instrument(skip_all)]
pub fn read_archive(source: Arc<dyn Source>, options: &ReaderOptions) -> Result<Archive, Error> {
    let size = source.len();
    if size < EOCD_RECORD_MIN_SIZE {
        return Err(FormatError::DirectoryEndSignatureNotFound.into());
    }

    let tail_len = size.min(EOCD_RECORD_MIN_SIZE + MAX_EOCD_COMMENT_SIZE);
    let tail_start = size - tail_len;
    let mut tail = vec![0u8; tail_len as usize];
    source.read_exact_at(tail_start, &mut tail)?;

    let located_eocd = EndOfCentralDirectoryRecord::find_in_block(&tail)
        .ok_or(FormatError::DirectoryEndSignatureNotFound)?;
    let dir = Located {
        offset: tail_start + located_eocd.offset,
        inner: located_eocd.inner,
    };
    trace!(offset = dir.offset, "found end of central directory record");

    let dir64 = find_zip64_eocd(&source, &dir)?;

    let eocd = EndOfCentralDirectory::new(size, dir, dir64)?;
    reject_split_archive(&eocd)?;

    let directory_records = eocd.directory_records();
    let directory_size = eocd.directory_size();
    let directory_offset = eocd.directory_offset();

    // Each central directory record is at least 46 bytes; use that to reject
    // an obviously-impossible claimed entry count before trying to allocate
    // or parse anything.
    const MIN_CD_RECORD_SIZE: u64 = 46;
    if directory_records.saturating_mul(MIN_CD_RECORD_SIZE) > size {
        return Err(FormatError::ImpossibleNumberOfFiles {
            claimed_records_count: directory_records,
            zip_size: size,
        }
        .into());
    }

    let mut cd_buf = vec![0u8; directory_size as usize];
    source.read_exact_at(directory_offset, &mut cd_buf)?;

    let mut headers = Vec::with_capacity(directory_records as usize);
    let mut input = Partial::new(&cd_buf[..]);
    for _ in 0..directory_records {
        match CentralDirectoryFileHeader::parser.parse_next(&mut input) {
            Ok(h) => headers.push(h),
            Err(e) => {
                trace!("central directory record parse error: {:#?}", e);
                return Err(FormatError::InvalidCentralRecord {
                    expected: directory_records,
                    actual: headers.len() as u64,
                }
                .into());
            }
        }
    }

    let global_offset = eocd.global_offset.max(0) as u64;
    let encoding = resolve_encoding(options, &headers, eocd.comment());

    let mut archive = Archive::new();
    for header in &headers {
        let mut entry = header.as_entry(encoding, global_offset)?;
        confirm_local_header(&source, &mut entry)?;
        archive.push_raw(entry);
    }

    if !eocd.comment().is_empty() {
        archive.set_comment_raw(Some(encoding.decode(eocd.comment())?));
    }
    archive.snapshot_as_source();

    Ok(archive)
}

fn find_zip64_eocd(
    source: &Arc<dyn Source>,
    dir: &Located<EndOfCentralDirectoryRecord>,
) -> Result<Option<Located<EndOfCentralDirectory64Record>>, Error> {
    if dir.offset < EndOfCentralDirectory64Locator::LENGTH as u64 {
        return Ok(None);
    }
    let locator_offset = dir.offset - EndOfCentralDirectory64Locator::LENGTH as u64;
    let mut locator_buf = [0u8; EndOfCentralDirectory64Locator::LENGTH];
    if source.read_exact_at(locator_offset, &mut locator_buf).is_err() {
        return Ok(None);
    }
    let mut input = Partial::new(&locator_buf[..]);
    let locator = match EndOfCentralDirectory64Locator::parser.parse_next(&mut input) {
        Ok(l) => l,
        Err(_) => return Ok(None),
    };

    let mut record_buf = vec![0u8; 56];
    source.read_exact_at(locator.directory_offset, &mut record_buf)?;
    let mut input = Partial::new(&record_buf[..]);
    let record = EndOfCentralDirectory64Record::parser
        .parse_next(&mut input)
        .map_err(|_| FormatError::Directory64EndRecordInvalid)?;

    Ok(Some(Located {
        offset: locator.directory_offset,
        inner: record,
    }))
}

fn reject_split_archive(eocd: &EndOfCentralDirectory) -> Result<(), Error> {
    let dir = &eocd.dir.inner;
    if dir.disk_nbr != 0 || dir.dir_disk_nbr != 0 || dir.dir_records_this_disk != dir.directory_records
    {
        return Err(UnsupportedError::SplitArchive.into());
    }
    if let Some(dir64) = &eocd.dir64 {
        if dir64.inner.disk_nbr != 0 || dir64.inner.dir_disk_nbr != 0 {
            return Err(UnsupportedError::SplitArchive.into());
        }
    }
    Ok(())
}

fn resolve_encoding(
    options: &ReaderOptions,
    headers: &[CentralDirectoryFileHeader],
    archive_comment: &[u8],
) -> Encoding {
    if let Some(charset) = options.charset {
        return charset;
    }

    let mut any_non_utf8 = !archive_comment.is_empty()
        && is_entry_non_utf8(&[], archive_comment, 0x800);
    for h in headers {
        if is_entry_non_utf8(&h.name, &h.comment, h.flags) {
            any_non_utf8 = true;
            break;
        }
    }

    if !any_non_utf8 {
        return Encoding::Utf8;
    }

    let fields = headers
        .iter()
        .flat_map(|h| [h.name.as_slice(), h.comment.as_slice()])
        .chain(std::iter::once(archive_comment));
    detect_encoding(fields)
}
