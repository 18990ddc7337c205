//! Package stream codec and disk I/O
//!
//! ```text
//! [header: 20 bytes][entry table][comment blob]
//! ```
//!
//! The entry table ends at `comment_start` when a comment is present and
//! at the end of the stream otherwise.

use crate::catalog::{type_codes, EntryTable};
use crate::error::{NovusPackError, Result};
use crate::header::{flags, PackageHeader, HEADER_SIZE};
use crate::metadata::is_metadata_only;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A decoded package stream
#[derive(Debug, Clone)]
pub struct DecodedPackage {
    pub header: PackageHeader,
    pub table: EntryTable,
    pub comment: Option<String>,
    /// Absolute start offset of each entry record
    pub offsets: Vec<u64>,
}

/// Feature bits implied by the table contents
pub(crate) fn feature_flags(header: &PackageHeader, table: &EntryTable, has_comment: bool) -> u32 {
    let mut bits = 0;
    let mut set = |flag: u32, on: bool| {
        if on {
            bits |= flag;
        }
    };

    set(
        flags::HAS_SIGNATURES,
        table
            .files()
            .any(|f| f.security.is_signed() || f.type_code == type_codes::PACKAGE_SIGNATURE),
    );
    set(flags::HAS_ENCRYPTED_FILES, table.files().any(|f| f.is_encrypted()));
    set(flags::HAS_COMMENT, has_comment);
    set(
        flags::HAS_PER_FILE_TAGS,
        table.files().any(|f| !f.tags.is_empty()),
    );
    set(flags::HAS_SPECIAL_METADATA, table.files().any(|f| f.is_special()));
    set(flags::METADATA_ONLY, is_metadata_only(header, table));

    bits
}

/// Encode a package, returning the bytes and the header written
///
/// `file_count` is taken from `header` as-is; the feature bits and comment
/// fields are recomputed.
pub fn encode_package(
    header: &PackageHeader,
    table: &EntryTable,
    comment: Option<&str>,
) -> Result<(Vec<u8>, PackageHeader)> {
    let (entries, _) = table.encode(HEADER_SIZE as u64)?;
    let comment = comment.filter(|c| !c.is_empty());

    let mut out_header = *header;
    out_header.total_entry_size = entries.len() as u64;
    match comment {
        Some(text) => {
            out_header.comment_size = u32::try_from(text.len()).map_err(|_| NovusPackError::Length {
                field: "comment",
                actual: text.len(),
                max: u32::MAX as usize,
            })?;
            out_header.comment_start = out_header.entry_table_end();
        }
        None => {
            out_header.comment_size = 0;
            out_header.comment_start = 0;
        }
    }
    out_header.flags = (header.flags & !flags::MASK_FEATURES)
        | feature_flags(header, table, comment.is_some());

    let mut bytes = out_header.to_bytes();
    bytes.extend_from_slice(&entries);
    if let Some(text) = comment {
        bytes.extend_from_slice(text.as_bytes());
    }

    Ok((bytes, out_header))
}

/// Decode a package stream
///
/// Only framing is checked here (header invariants, record syntax, comment
/// UTF-8). Semantic checks belong to [`crate::validator`].
pub fn decode_package(bytes: &[u8]) -> Result<DecodedPackage> {
    let mut header = PackageHeader::from_bytes(bytes)?;

    let (table_end, comment) = if header.has_comment() {
        let start = usize::try_from(header.comment_start).map_err(|_| {
            NovusPackError::Encoding(format!("comment_start {} out of range", header.comment_start))
        })?;
        let end = start
            .checked_add(header.comment_size as usize)
            .filter(|&end| end == bytes.len())
            .ok_or_else(|| {
                NovusPackError::Encoding(format!(
                    "comment blob [{}, +{}) does not end the {} byte stream",
                    start,
                    header.comment_size,
                    bytes.len()
                ))
            })?;
        let text = std::str::from_utf8(&bytes[start..end]).map_err(|e| {
            NovusPackError::Encoding(format!(
                "comment is not valid UTF-8 (error at byte {})",
                start + e.valid_up_to()
            ))
        })?;
        (start, Some(text.to_string()))
    } else {
        (bytes.len(), None)
    };

    let (table, offsets) = EntryTable::decode(&bytes[HEADER_SIZE..table_end], HEADER_SIZE as u64)?;
    header.total_entry_size = (table_end - HEADER_SIZE) as u64;

    Ok(DecodedPackage {
        header,
        table,
        comment,
        offsets,
    })
}

/// Disk-backed package file
pub struct PackageFile {
    file: File,
    path: PathBuf,
}

impl PackageFile {
    /// Create (or truncate) a package file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(PackageFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing package file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(&path)?;

        Ok(PackageFile {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.file.read_to_end(&mut buffer)?;
        if buffer.len() < HEADER_SIZE {
            return Err(NovusPackError::Encoding(format!(
                "{:?} is too short to be a package ({} bytes)",
                self.path,
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    /// Write the whole stream and sync it to disk
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
