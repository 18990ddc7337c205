//! File and directory entry records

use crate::codec::{put_optional_str, put_short_str, put_u16, put_u32, put_u64, ByteReader};
use crate::error::{NovusPackError, Result};
use crate::path::parent_path;
use crate::security::signature::ENTRY_DOMAIN;
use crate::security::{
    Checksum, ChecksumAlgorithm, EncryptionType, SecurityMetadata, SignatureBlock, SigningMessage,
};
use crate::tag::{decode_tag_map, encode_tag_map, TagMap};
use serde::{Deserialize, Serialize};

/// Reserved type codes for special metadata files
///
/// Codes below [`RESERVED_START`](type_codes::RESERVED_START) are ordinary
/// content; everything from 65000 up is reserved.
pub mod type_codes {
    /// Generic file content
    pub const GENERIC: u16 = 0;

    pub const RESERVED_START: u16 = 65000;

    pub const UPDATE_MANIFEST: u16 = 65000;
    pub const INSTALL_SCRIPT: u16 = 65001;
    pub const PACKAGE_RELATIONSHIPS: u16 = 65002;
    pub const PACKAGE_INFO: u16 = 65003;
    /// Payload is the package [`SignatureBlock`](crate::security::SignatureBlock)
    pub const PACKAGE_SIGNATURE: u16 = 65004;

    pub fn is_reserved(code: u16) -> bool {
        code >= RESERVED_START
    }
}

/// Entry discriminator on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File = 0,
    Directory = 1,
}

/// A file stored in the package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Normalized path
    pub path: String,

    pub type_code: u16,

    /// Bumped on every metadata mutation
    pub metadata_version: u32,

    /// Plaintext size in bytes
    pub size: u64,

    /// Explicit owning directory, overriding the lexical parent
    pub directory: Option<String>,

    pub tags: TagMap,

    /// Custom key/value bag (keys are `[A-Za-z0-9_]`)
    pub custom: TagMap,

    pub security: SecurityMetadata,

    /// Stored bytes (ciphertext when encrypted)
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl FileEntry {
    /// Create an unencrypted file entry
    pub fn new(path: String, type_code: u16, data: Vec<u8>, algorithm: ChecksumAlgorithm) -> Self {
        let security = SecurityMetadata::for_payload(algorithm, &data, EncryptionType::None);
        FileEntry {
            path,
            type_code,
            metadata_version: 1,
            size: data.len() as u64,
            directory: None,
            tags: TagMap::new(),
            custom: TagMap::new(),
            security,
            data,
        }
    }

    /// Create a file entry whose stored bytes are already encrypted
    pub fn with_ciphertext(
        path: String,
        type_code: u16,
        plaintext_size: u64,
        ciphertext: Vec<u8>,
        encryption: EncryptionType,
        algorithm: ChecksumAlgorithm,
    ) -> Self {
        let security = SecurityMetadata::for_payload(algorithm, &ciphertext, encryption);
        FileEntry {
            path,
            type_code,
            metadata_version: 1,
            size: plaintext_size,
            directory: None,
            tags: TagMap::new(),
            custom: TagMap::new(),
            security,
            data: ciphertext,
        }
    }

    pub fn is_special(&self) -> bool {
        type_codes::is_reserved(self.type_code)
    }

    pub fn is_encrypted(&self) -> bool {
        self.security.encryption.is_encrypted()
    }

    /// Record a metadata change
    pub fn bump_version(&mut self) {
        self.metadata_version = self.metadata_version.wrapping_add(1);
    }

    /// Replace the stored bytes and recompute the checksum
    ///
    /// Any signature is dropped since it no longer covers the content.
    pub(crate) fn replace_data(&mut self, data: Vec<u8>, plaintext_size: u64) {
        self.security.checksum = Checksum::compute(self.security.checksum.algorithm, &data);
        self.security.signature = None;
        self.size = plaintext_size;
        self.data = data;
        self.bump_version();
    }

    /// Digest an entry signature covers
    ///
    /// `metadata_version` is left out so signing does not invalidate itself.
    pub fn signing_message(&self) -> Result<[u8; 32]> {
        let mut directory = Vec::new();
        put_optional_str(&mut directory, self.directory.as_deref())?;
        let mut tags = Vec::new();
        encode_tag_map(&self.tags, &mut tags)?;
        let mut custom = Vec::new();
        encode_tag_map(&self.custom, &mut custom)?;
        let mut checksum = Vec::new();
        self.security.checksum.encode(&mut checksum);

        let mut message = SigningMessage::new(ENTRY_DOMAIN);
        message
            .field(self.path.as_bytes())
            .field(&self.type_code.to_le_bytes())
            .field(&self.size.to_le_bytes())
            .field(&directory)
            .field(&tags)
            .field(&custom)
            .field(&checksum)
            .field(&[self.security.encryption as u8]);
        Ok(message.finish())
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<()> {
        put_u32(out, self.metadata_version);
        put_u64(out, self.size);
        put_optional_str(out, self.directory.as_deref())?;
        encode_tag_map(&self.tags, out)?;
        encode_tag_map(&self.custom, out)?;
        self.security.checksum.encode(out);
        match &self.security.signature {
            Some(sig) => {
                out.push(1);
                sig.encode(out);
            }
            None => out.push(0),
        }
        out.push(self.security.encryption as u8);
        put_u64(out, self.data.len() as u64);
        out.extend_from_slice(&self.data);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, path: String, type_code: u16) -> Result<Self> {
        let metadata_version = reader.u32()?;
        let size = reader.u64()?;
        let directory = reader.optional_str()?;
        let tags = decode_tag_map(reader)?;
        let custom = decode_tag_map(reader)?;
        let checksum = Checksum::decode(reader)?;
        let signature = if reader.bool()? {
            Some(SignatureBlock::decode(reader)?)
        } else {
            None
        };

        let offset = reader.offset();
        let code = reader.u8()?;
        let encryption = EncryptionType::from_u8(code).ok_or_else(|| {
            NovusPackError::Encoding(format!(
                "unknown encryption type 0x{:02X} at offset {}",
                code, offset
            ))
        })?;

        let len = reader.u64()?;
        let len = usize::try_from(len).map_err(|_| {
            NovusPackError::Encoding(format!("payload length {} does not fit in memory", len))
        })?;
        let data = reader.take(len)?.to_vec();

        Ok(FileEntry {
            path,
            type_code,
            metadata_version,
            size,
            directory,
            tags,
            custom,
            security: SecurityMetadata {
                checksum,
                signature,
                encryption,
            },
            data,
        })
    }
}

/// A directory and the metadata it passes down
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Normalized path
    pub path: String,

    pub type_code: u16,

    /// Lexical parent path, `None` at the top level
    pub parent: Option<String>,

    /// Whether tags flow past this directory to deeper descendants
    pub inheritance_enabled: bool,

    pub tags: TagMap,

    /// Unix permission bits
    pub permissions: u32,

    /// Unix epoch seconds
    pub created_at: u64,

    /// Unix epoch seconds
    pub modified_at: u64,
}

impl DirectoryEntry {
    pub fn new(path: String) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        DirectoryEntry {
            parent: parent_path(&path).map(str::to_string),
            path,
            type_code: type_codes::GENERIC,
            inheritance_enabled: true,
            tags: TagMap::new(),
            permissions: 0o755,
            created_at: now,
            modified_at: now,
        }
    }

    /// Update the modification timestamp
    pub fn touch(&mut self) {
        self.modified_at = chrono::Utc::now().timestamp().max(0) as u64;
    }

    fn encode_body(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.inheritance_enabled as u8);
        put_optional_str(out, self.parent.as_deref())?;
        encode_tag_map(&self.tags, out)?;
        put_u32(out, self.permissions);
        put_u64(out, self.created_at);
        put_u64(out, self.modified_at);
        Ok(())
    }

    fn decode_body(reader: &mut ByteReader<'_>, path: String, type_code: u16) -> Result<Self> {
        Ok(DirectoryEntry {
            inheritance_enabled: reader.bool()?,
            parent: reader.optional_str()?,
            tags: decode_tag_map(reader)?,
            permissions: reader.u32()?,
            created_at: reader.u64()?,
            modified_at: reader.u64()?,
            path,
            type_code,
        })
    }
}

/// Entry in the package table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entry {
    File(FileEntry),
    Directory(DirectoryEntry),
}

impl Entry {
    pub fn path(&self) -> &str {
        match self {
            Entry::File(f) => &f.path,
            Entry::Directory(d) => &d.path,
        }
    }

    pub fn type_code(&self) -> u16 {
        match self {
            Entry::File(f) => f.type_code,
            Entry::Directory(d) => d.type_code,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::File(_) => EntryKind::File,
            Entry::Directory(_) => EntryKind::Directory,
        }
    }

    pub fn tags(&self) -> &TagMap {
        match self {
            Entry::File(f) => &f.tags,
            Entry::Directory(d) => &d.tags,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Entry::File(_))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Entry::Directory(_))
    }

    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Entry::File(f) => Some(f),
            Entry::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Entry::Directory(d) => Some(d),
            Entry::File(_) => None,
        }
    }

    /// Append the encoded record to `out`
    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.kind() as u8);
        put_u16(out, self.type_code());
        put_short_str(out, self.path())?;
        match self {
            Entry::File(f) => f.encode_body(out),
            Entry::Directory(d) => d.encode_body(out),
        }
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.offset();
        let kind = reader.u8()?;
        let type_code = reader.u16()?;
        let path = reader.short_str()?;

        match kind {
            0 => Ok(Entry::File(FileEntry::decode_body(reader, path, type_code)?)),
            1 => Ok(Entry::Directory(DirectoryEntry::decode_body(
                reader, path, type_code,
            )?)),
            other => Err(NovusPackError::Encoding(format!(
                "unknown entry kind {} at offset {}",
                other, offset
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagValue;

    #[test]
    fn test_reserved_type_codes() {
        assert!(!type_codes::is_reserved(0));
        assert!(!type_codes::is_reserved(64999));
        assert!(type_codes::is_reserved(type_codes::UPDATE_MANIFEST));
        assert!(type_codes::is_reserved(u16::MAX));
    }

    #[test]
    fn test_file_entry_record() {
        let mut file = FileEntry::new("/a/b.txt".into(), 12, b"hello".to_vec(), ChecksumAlgorithm::Crc32);
        file.directory = Some("/a".into());
        file.tags.insert("category".into(), TagValue::from("texture"));
        file.custom.insert("build_number".into(), TagValue::Integer(7));
        let entry = Entry::File(file);

        let mut out = Vec::new();
        entry.encode(&mut out).unwrap();
        assert_eq!(out[0], EntryKind::File as u8);
        assert_eq!(&out[1..3], &12u16.to_le_bytes());

        let mut reader = ByteReader::new(&out, 20);
        let decoded = Entry::decode(&mut reader).unwrap();
        assert!(reader.is_empty());
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_directory_entry_record() {
        let mut dir = DirectoryEntry::new("/a/b".into());
        dir.inheritance_enabled = false;
        dir.tags.insert("zone".into(), TagValue::Integer(3));
        assert_eq!(dir.parent.as_deref(), Some("/a"));
        let entry = Entry::Directory(dir);

        let mut out = Vec::new();
        entry.encode(&mut out).unwrap();
        let decoded = Entry::decode(&mut ByteReader::new(&out, 0)).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bytes = [9u8, 0, 0, 1, 0, b'x'];
        assert!(matches!(
            Entry::decode(&mut ByteReader::new(&bytes, 0)),
            Err(NovusPackError::Encoding(_))
        ));
    }

    #[test]
    fn test_signing_message_covers_metadata() {
        let base = FileEntry::new("/a/b.txt".into(), 0, b"hello".to_vec(), ChecksumAlgorithm::Sha256);
        let digest = base.signing_message().unwrap();

        let mut bumped = base.clone();
        bumped.bump_version();
        assert_eq!(bumped.signing_message().unwrap(), digest);

        let mut tagged = base.clone();
        tagged.tags.insert("channel".into(), TagValue::from("stable"));
        let mut custom = base.clone();
        custom.custom.insert("build".into(), TagValue::Integer(1));
        let mut associated = base.clone();
        associated.directory = Some("/a".into());
        let mut resized = base.clone();
        resized.size = 6;
        for changed in [tagged, custom, associated, resized] {
            assert_ne!(changed.signing_message().unwrap(), digest);
        }
    }

    #[test]
    fn test_replace_data_drops_signature_and_bumps_version() {
        let mut file = FileEntry::new("/x".into(), 0, b"one".to_vec(), ChecksumAlgorithm::Sha256);
        let before = file.security.checksum.clone();
        file.replace_data(b"two".to_vec(), 3);
        assert_ne!(file.security.checksum, before);
        assert!(file.security.signature.is_none());
        assert_eq!(file.metadata_version, 2);
    }
}
