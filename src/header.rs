use crate::codec::{put_u32, put_u64, ByteReader};
use crate::error::{NovusPackError, Result};
use serde::{Deserialize, Serialize};

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = 20;

/// Current format version, stored in flag bits 24-31
pub const FORMAT_VERSION: u8 = 1;

/// Package feature flags
///
/// # Layout
///
/// ```text
/// Bit 0:      has signatures
/// Bit 1:      has compressed files (reserved, never set by this crate)
/// Bit 2:      has encrypted files
/// Bit 3:      has extended attributes (reserved)
/// Bit 4:      has package comment
/// Bit 5:      has per-file tags
/// Bit 6:      has special metadata files
/// Bit 7:      metadata-only package
/// Bits 8-23:  reserved, must be zero
/// Bits 24-31: format version
/// ```
pub mod flags {
    pub const HAS_SIGNATURES: u32 = 1 << 0;
    pub const HAS_COMPRESSED_FILES: u32 = 1 << 1;
    pub const HAS_ENCRYPTED_FILES: u32 = 1 << 2;
    pub const HAS_EXTENDED_ATTRS: u32 = 1 << 3;
    pub const HAS_COMMENT: u32 = 1 << 4;
    pub const HAS_PER_FILE_TAGS: u32 = 1 << 5;
    pub const HAS_SPECIAL_METADATA: u32 = 1 << 6;
    pub const METADATA_ONLY: u32 = 1 << 7;

    pub const MASK_FEATURES: u32 = 0x0000_00FF;
    pub const MASK_RESERVED: u32 = 0x00FF_FF00;
    pub const MASK_VERSION: u32 = 0xFF00_0000;
    pub const SHIFT_VERSION: u32 = 24;
}

/// Fixed package header
///
/// Occupies the first [`HEADER_SIZE`] bytes of a package. The entry table
/// follows immediately; when a comment is present it runs up to
/// `comment_start`, otherwise to the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageHeader {
    /// Feature bitmask plus format version in the top byte
    pub flags: u32,

    /// Number of ordinary content files (0 for metadata-only packages)
    pub file_count: u32,

    /// Byte length of the comment blob, 0 if absent
    pub comment_size: u32,

    /// Absolute offset of the comment blob, 0 if absent
    pub comment_start: u64,

    /// Encoded size of the entry table (derived, not stored on the wire)
    #[serde(skip)]
    pub total_entry_size: u64,
}

impl PackageHeader {
    /// Create a new header with default values
    pub fn new() -> Self {
        PackageHeader {
            flags: (FORMAT_VERSION as u32) << flags::SHIFT_VERSION,
            file_count: 0,
            comment_size: 0,
            comment_start: 0,
            total_entry_size: 0,
        }
    }

    pub fn format_version(&self) -> u8 {
        ((self.flags & flags::MASK_VERSION) >> flags::SHIFT_VERSION) as u8
    }

    /// Feature bits 0-7
    pub fn features(&self) -> u8 {
        (self.flags & flags::MASK_FEATURES) as u8
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u32, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn has_comment(&self) -> bool {
        self.has_flag(flags::HAS_COMMENT)
    }

    /// Offset where the entry table ends and the comment blob begins
    pub fn entry_table_end(&self) -> u64 {
        HEADER_SIZE as u64 + self.total_entry_size
    }

    /// Validate version, reserved bits, and the comment invariant
    ///
    /// The comment invariant is `comment_size > 0` iff bit 4 is set iff
    /// `comment_start` points past the entry table.
    pub fn validate(&self) -> Result<()> {
        if self.format_version() != FORMAT_VERSION {
            return Err(NovusPackError::validation(
                "format_version",
                format!(
                    "unsupported format version {} (expected {})",
                    self.format_version(),
                    FORMAT_VERSION
                ),
            ));
        }

        if self.flags & flags::MASK_RESERVED != 0 {
            return Err(NovusPackError::validation(
                "flags",
                format!("reserved bits set: 0x{:08X}", self.flags & flags::MASK_RESERVED),
            ));
        }

        let sized = self.comment_size > 0;
        if sized != self.has_comment() {
            return Err(NovusPackError::validation(
                "flags",
                format!(
                    "comment flag is {} but comment_size is {}",
                    self.has_comment(),
                    self.comment_size
                ),
            ));
        }

        if sized {
            if self.comment_start < HEADER_SIZE as u64 {
                return Err(NovusPackError::validation(
                    "comment_start",
                    format!("comment_start {} points inside the header", self.comment_start),
                ));
            }
        } else if self.comment_start != 0 {
            return Err(NovusPackError::validation(
                "comment_start",
                "comment_start must be 0 when no comment is present",
            ));
        }

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);

        put_u32(&mut bytes, self.flags);
        put_u32(&mut bytes, self.file_count);
        put_u32(&mut bytes, self.comment_size);
        put_u64(&mut bytes, self.comment_start);

        bytes
    }

    /// Deserialize header from bytes
    ///
    /// Only the fixed fields are read; `total_entry_size` is filled in by the
    /// caller once the entry table extent is known.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(NovusPackError::Encoding(format!(
                "insufficient bytes for header: {} < {}",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut reader = ByteReader::new(&bytes[..HEADER_SIZE], 0);
        let header = PackageHeader {
            flags: reader.u32()?,
            file_count: reader.u32()?,
            comment_size: reader.u32()?,
            comment_start: reader.u64()?,
            total_entry_size: 0,
        };

        header.validate()?;

        Ok(header)
    }
}

impl Default for PackageHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_creation() {
        let header = PackageHeader::new();
        assert_eq!(header.format_version(), FORMAT_VERSION);
        assert_eq!(header.file_count, 0);
        assert!(!header.has_comment());
        assert!(header.validate().is_ok());
    }

    #[test]
    fn test_header_serialization() {
        let mut header = PackageHeader::new();
        header.file_count = 3;
        header.comment_size = 8;
        header.comment_start = 512;
        header.set_flag(flags::HAS_COMMENT, true);

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let decoded = PackageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_byte_layout() {
        let mut header = PackageHeader::new();
        header.file_count = 0x0102_0304;
        header.comment_size = 5;
        header.comment_start = 0x40;
        header.set_flag(flags::HAS_COMMENT, true);

        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], &(0x0100_0010u32).to_le_bytes());
        assert_eq!(&bytes[4..8], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..12], &5u32.to_le_bytes());
        assert_eq!(&bytes[12..20], &0x40u64.to_le_bytes());
    }

    #[test]
    fn test_comment_flag_mismatch() {
        let mut header = PackageHeader::new();
        header.comment_size = 4;
        header.comment_start = 100;
        assert!(matches!(
            header.validate(),
            Err(NovusPackError::Validation { .. })
        ));

        let mut header = PackageHeader::new();
        header.set_flag(flags::HAS_COMMENT, true);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_stray_comment_start_rejected() {
        let mut header = PackageHeader::new();
        header.comment_start = 64;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_unsupported_version() {
        let mut header = PackageHeader::new();
        header.flags = 9 << flags::SHIFT_VERSION;
        assert_eq!(header.format_version(), 9);
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_reserved_bits_rejected() {
        let mut header = PackageHeader::new();
        header.flags |= 1 << 12;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_short_input() {
        assert!(matches!(
            PackageHeader::from_bytes(&[0u8; 10]),
            Err(NovusPackError::Encoding(_))
        ));
    }

    #[test]
    fn test_set_and_clear_flag() {
        let mut header = PackageHeader::new();
        header.set_flag(flags::HAS_SIGNATURES, true);
        header.set_flag(flags::HAS_PER_FILE_TAGS, true);
        assert_eq!(header.features(), 0b0010_0001);
        header.set_flag(flags::HAS_SIGNATURES, false);
        assert_eq!(header.features(), 0b0010_0000);
        assert_eq!(header.format_version(), FORMAT_VERSION);
    }
}
