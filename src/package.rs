//! Package handle
//!
//! [`Package`] owns the header, entry table, and comment behind a
//! readers-writer lock. Reads take the shared lock and may run
//! concurrently; writer operations take the exclusive lock and are only
//! allowed on a [`AccessMode::Writable`] handle.
//!
//! Every writer operation validates its input before touching state, so a
//! rejected call leaves the package exactly as it was.

use crate::cancel::CancellationToken;
use crate::catalog::{type_codes, DirectoryEntry, Entry, EntryTable, FileEntry};
use crate::comment::{comment_digest, sanitize_comment, sanitize_comment_bytes, SanitizedComment};
use crate::config::PackageConfig;
use crate::error::{NovusPackError, Result};
use crate::header::PackageHeader;
use crate::inheritance;
use crate::io::{decode_package, encode_package, PackageFile};
use crate::metadata::special::{PackageInfo, SpecialFile};
use crate::metadata::{self, DirectoryMetadata};
use crate::path::normalize_path;
use crate::query;
use crate::security::encryption::{decrypt, encrypt, EncryptionKey};
use crate::security::{
    is_package_signature, package_signing_message, Checksum, ChecksumAlgorithm, EncryptionRule,
    EncryptionType, EncryptionValidator, SecurityStatus, SignatureBlock, ValidationReport,
    PACKAGE_SIGNATURE_PATH,
};
use crate::tag::{validate_tag_key, TagMap, TagValue};
use crate::validator::{self, PackageView, ValidationOptions};
use ed25519_dalek::SigningKey;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a handle may be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    Writable,
}

/// Options for adding a file
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Payload; a file without one is rejected (empty is fine)
    pub data: Option<Vec<u8>>,
    pub type_code: u16,
    pub tags: TagMap,
    /// Overrides the configured checksum algorithm
    pub checksum: Option<ChecksumAlgorithm>,
    /// Encrypt the payload with AES-256-GCM under this key
    pub encryption_key: Option<EncryptionKey>,
}

impl FileOptions {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        FileOptions {
            data: Some(data.into()),
            ..Self::default()
        }
    }

    pub fn type_code(mut self, code: u16) -> Self {
        self.type_code = code;
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    pub fn encrypt_with(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }
}

/// Package statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStats {
    pub entry_count: usize,
    pub file_count: usize,
    pub directory_count: usize,
    pub special_file_count: usize,
    pub encrypted_file_count: usize,
    pub signed_file_count: usize,
    /// Sum of stored payload sizes
    pub stored_bytes: u64,
    pub has_comment: bool,
    pub metadata_only: bool,
}

#[derive(Debug, Default)]
struct PackageState {
    header: PackageHeader,
    table: EntryTable,
    comment: Option<String>,
    /// SHA-256 of `comment`
    comment_digest: Option<[u8; 32]>,
    /// Header no longer reflects the table and comment
    dirty: bool,
}

impl PackageState {
    fn mark_dirty(&mut self) {
        self.header.file_count = self.table.ordinary_file_count() as u32;
        self.dirty = true;
    }

    /// Header as it would be written
    fn current_header(&self) -> Result<PackageHeader> {
        if self.dirty {
            Ok(encode_package(&self.header, &self.table, self.comment.as_deref())?.1)
        } else {
            Ok(self.header)
        }
    }

    fn view<'a>(&'a self, header: &'a PackageHeader) -> PackageView<'a> {
        PackageView {
            header,
            table: &self.table,
            comment: self.comment.as_deref(),
        }
    }
}

/// A NovusPack package
pub struct Package {
    config: PackageConfig,
    mode: AccessMode,
    path: Option<PathBuf>,
    rules: EncryptionValidator,
    state: RwLock<PackageState>,
}

impl Package {
    /// Create an empty writable package
    pub fn create(config: PackageConfig) -> Result<Self> {
        config.check()?;
        info!("Creating package (checksum: {})", config.checksum_algorithm);
        let rules = EncryptionValidator::new(config.max_encrypted_data_size);
        Ok(Package {
            config,
            mode: AccessMode::Writable,
            path: None,
            rules,
            state: RwLock::new(PackageState::default()),
        })
    }

    /// Decode a package stream
    pub fn from_bytes(bytes: &[u8], mode: AccessMode) -> Result<Self> {
        Self::from_bytes_with_config(bytes, mode, PackageConfig::default())
    }

    pub fn from_bytes_with_config(bytes: &[u8], mode: AccessMode, config: PackageConfig) -> Result<Self> {
        config.check()?;
        let decoded = decode_package(bytes)?;
        if decoded.table.len() > config.max_entries {
            return Err(NovusPackError::Length {
                field: "entry table",
                actual: decoded.table.len(),
                max: config.max_entries,
            });
        }
        debug!(
            "Decoded package: {} entries, {} bytes, mode {:?}",
            decoded.table.len(),
            bytes.len(),
            mode
        );

        let rules = EncryptionValidator::new(config.max_encrypted_data_size);
        let digest = decoded.comment.as_deref().map(comment_digest);
        Ok(Package {
            config,
            mode,
            path: None,
            rules,
            state: RwLock::new(PackageState {
                header: decoded.header,
                table: decoded.table,
                comment: decoded.comment,
                comment_digest: digest,
                dirty: false,
            }),
        })
    }

    /// Open a package file
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self> {
        Self::open_with_config(path, mode, PackageConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, mode: AccessMode, config: PackageConfig) -> Result<Self> {
        info!("Opening package at {:?} ({:?})", path.as_ref(), mode);
        let bytes = PackageFile::open(&path)?.read_all()?;
        let mut package = Self::from_bytes_with_config(&bytes, mode, config)?;
        package.path = Some(path.as_ref().to_path_buf());
        Ok(package)
    }

    /// Encode the package
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = self.state.read();
        Ok(encode_package(&state.header, &state.table, state.comment.as_deref())?.0)
    }

    /// Write the package to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut state = self.state.write();
        let (bytes, header) = encode_package(&state.header, &state.table, state.comment.as_deref())?;
        PackageFile::create(&path)?.write_all(&bytes)?;
        state.header = header;
        state.dirty = false;
        info!("Saved package to {:?} ({} bytes)", path.as_ref(), bytes.len());
        Ok(())
    }

    /// Write back to the file this package was opened from or built at
    pub fn flush(&self) -> Result<()> {
        self.ensure_writable()?;
        let path = self.path.as_ref().ok_or_else(|| {
            NovusPackError::validation("path", "package has no backing file")
        })?;
        self.save(path)
    }

    /// Flush pending changes (if file-backed and writable) and drop the handle
    pub fn close(self) -> Result<()> {
        let dirty = self.state.read().dirty;
        if self.mode == AccessMode::Writable && dirty && self.path.is_some() {
            self.flush()?;
        }
        debug!("Closed package");
        Ok(())
    }

    /// Downgrade to a read-only handle
    pub fn into_read_only(mut self) -> Self {
        self.mode = AccessMode::ReadOnly;
        self
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_writable(&self) -> bool {
        self.mode == AccessMode::Writable
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Header as it would be written now
    pub fn header(&self) -> Result<PackageHeader> {
        self.state.read().current_header()
    }

    pub fn stats(&self) -> PackageStats {
        let state = self.state.read();
        let table = &state.table;
        PackageStats {
            entry_count: table.len(),
            file_count: table.files().count(),
            directory_count: table.directories().count(),
            special_file_count: table.files().filter(|f| f.is_special()).count(),
            encrypted_file_count: table.files().filter(|f| f.is_encrypted()).count(),
            signed_file_count: table.files().filter(|f| f.security.is_signed()).count(),
            stored_bytes: table.files().map(|f| f.data.len() as u64).sum(),
            has_comment: state.comment.is_some(),
            metadata_only: metadata::is_metadata_only(&state.header, table),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.mode {
            AccessMode::Writable => Ok(()),
            AccessMode::ReadOnly => Err(NovusPackError::ReadOnly),
        }
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, PackageState>> {
        self.ensure_writable()?;
        Ok(self.state.write())
    }

    // ---- comment ----

    /// Validate, sanitize, and store a package comment
    ///
    /// An empty comment clears it.
    pub fn set_comment(&self, text: &str) -> Result<()> {
        self.ensure_writable()?;
        let clean = sanitize_comment(text, self.config.max_comment_length)?;
        self.store_comment(clean)
    }

    /// Like [`set_comment`](Self::set_comment) for raw bytes, which must be UTF-8
    pub fn set_comment_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let clean = sanitize_comment_bytes(bytes, self.config.max_comment_length)?;
        self.store_comment(clean)
    }

    fn store_comment(&self, clean: SanitizedComment) -> Result<()> {
        let mut state = self.write_state()?;
        debug!("Setting comment ({} bytes)", clean.len());
        if clean.is_empty() {
            state.comment = None;
            state.comment_digest = None;
        } else {
            state.comment_digest = Some(*clean.digest());
            state.comment = Some(clean.into_string());
        }
        state.mark_dirty();
        Ok(())
    }

    /// Stored comment, empty when absent
    pub fn get_comment(&self) -> String {
        self.state.read().comment.clone().unwrap_or_default()
    }

    pub fn has_comment(&self) -> bool {
        self.state.read().comment.is_some()
    }

    /// SHA-256 of the stored comment, for content-addressed lookups
    pub fn comment_digest(&self) -> Option<[u8; 32]> {
        self.state.read().comment_digest
    }

    /// Remove the comment; clearing an absent comment is a no-op
    pub fn clear_comment(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if state.comment.take().is_some() {
            state.comment_digest = None;
            debug!("Cleared comment");
            state.mark_dirty();
        }
        Ok(())
    }

    // ---- entries ----

    fn check_capacity(&self, table: &EntryTable) -> Result<()> {
        if table.len() >= self.config.max_entries {
            return Err(NovusPackError::Length {
                field: "entry table",
                actual: table.len() + 1,
                max: self.config.max_entries,
            });
        }
        Ok(())
    }

    /// Add a file with default options, returning its normalized path
    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) -> Result<String> {
        self.add_file_with(path, FileOptions::new(data))
    }

    pub fn add_file_with(&self, path: &str, options: FileOptions) -> Result<String> {
        self.ensure_writable()?;
        let path = normalize_path(path)?;
        let data = options.data.ok_or_else(|| {
            NovusPackError::validation("data", format!("file entry '{}' has no payload", path))
        })?;
        for (key, value) in &options.tags {
            validate_tag_key(key)?;
            value.validate(self.config.max_tag_value_length)?;
        }
        let algorithm = options.checksum.unwrap_or(self.config.checksum_algorithm);

        let mut file = match options.encryption_key {
            Some(key) => {
                self.rules
                    .validate_encryption_key(&key, EncryptionType::Aes256Gcm)?;
                self.rules
                    .validate_encryption_data(&data, EncryptionType::Aes256Gcm)?;
                let ciphertext = encrypt(&data, &key)?;
                FileEntry::with_ciphertext(
                    path.clone(),
                    options.type_code,
                    data.len() as u64,
                    ciphertext,
                    EncryptionType::Aes256Gcm,
                    algorithm,
                )
            }
            None => FileEntry::new(path.clone(), options.type_code, data, algorithm),
        };
        file.tags = options.tags;

        let mut state = self.write_state()?;
        self.check_capacity(&state.table)?;
        state.table.insert(Entry::File(file))?;
        state.mark_dirty();
        debug!("Added file {} (type {})", path, options.type_code);
        Ok(path)
    }

    /// Add a directory, returning its normalized path
    pub fn add_directory(&self, path: &str) -> Result<String> {
        self.ensure_writable()?;
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        self.check_capacity(&state.table)?;
        state
            .table
            .insert(Entry::Directory(DirectoryEntry::new(path.clone())))?;
        state.mark_dirty();
        debug!("Added directory {}", path);
        Ok(path)
    }

    /// Store a special metadata file at its conventional path
    pub fn add_special_file(&self, special: &SpecialFile) -> Result<String> {
        let payload = special.to_payload()?;
        self.add_file_with(
            special.default_path(),
            FileOptions::new(payload).type_code(special.type_code()),
        )
    }

    /// Parse the first special file with `type_code`
    pub fn special_file(&self, type_code: u16) -> Result<Option<SpecialFile>> {
        if !type_codes::is_reserved(type_code) {
            return Err(NovusPackError::validation(
                "type_code",
                format!("{} is not a reserved type code", type_code),
            ));
        }
        let state = self.state.read();
        let found = state.table.files().find(|f| f.type_code == type_code);
        match found {
            Some(file) => Ok(Some(parse_special(file)?)),
            None => Ok(None),
        }
    }

    /// Remove an entry
    ///
    /// Removing a directory drops explicit associations that point at it.
    pub fn remove_entry(&self, path: &str) -> Result<Entry> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        let removed = state.table.remove(&path)?;
        if removed.is_directory() {
            let cleared = metadata::clear_associations_to(&mut state.table, &path);
            if cleared > 0 {
                debug!("Cleared {} associations to removed directory {}", cleared, path);
            }
        }
        state.mark_dirty();
        debug!("Removed entry {}", path);
        Ok(removed)
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_path(path)
            .map(|p| self.state.read().table.contains(&p))
            .unwrap_or(false)
    }

    pub fn entry(&self, path: &str) -> Result<Entry> {
        let path = normalize_path(path)?;
        self.state
            .read()
            .table
            .get(&path)
            .cloned()
            .ok_or_else(|| NovusPackError::not_found(path))
    }

    pub fn file(&self, path: &str) -> Result<FileEntry> {
        let path = normalize_path(path)?;
        self.state
            .read()
            .table
            .file(&path)
            .cloned()
            .ok_or_else(|| NovusPackError::not_found(path))
    }

    /// Entry paths in table order
    pub fn paths(&self) -> Vec<String> {
        self.state
            .read()
            .table
            .iter()
            .map(|e| e.path().to_string())
            .collect()
    }

    /// Entries with `type_code`, in table order
    pub fn find_entries_by_type(&self, type_code: u16) -> Vec<Entry> {
        self.state
            .read()
            .table
            .iter()
            .filter(|e| e.type_code() == type_code)
            .cloned()
            .collect()
    }

    /// First file whose stored checksum equals `checksum`
    ///
    /// Algorithm and digest must both match.
    pub fn file_by_checksum(&self, checksum: &Checksum) -> Option<FileEntry> {
        self.state
            .read()
            .table
            .files()
            .find(|f| f.security.checksum == *checksum)
            .cloned()
    }

    /// Directories grouped by parent, top-level ones under `/`
    pub fn path_hierarchy(&self) -> BTreeMap<String, Vec<String>> {
        let state = self.state.read();
        let mut hierarchy: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for dir in state.table.directories() {
            let parent = dir.parent.clone().unwrap_or_else(|| "/".to_string());
            hierarchy.entry(parent).or_default().push(dir.path.clone());
        }
        hierarchy
    }

    pub fn len(&self) -> usize {
        self.state.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().table.is_empty()
    }

    /// Read a file's plaintext; encrypted files need `key`
    pub fn read_file(&self, path: &str, key: Option<&EncryptionKey>) -> Result<Vec<u8>> {
        let file = self.file(path)?;
        file.security.checksum.verify(&file.data)?;
        match (file.security.encryption, key) {
            (EncryptionType::None, _) => Ok(file.data),
            (EncryptionType::Aes256Gcm, Some(key)) => {
                self.rules
                    .validate_decryption_data(&file.data, EncryptionType::Aes256Gcm)?;
                decrypt(&file.data, key)
            }
            (EncryptionType::Aes256Gcm, None) => Err(NovusPackError::validation(
                "key",
                format!("{} is encrypted and no key was supplied", file.path),
            )),
            (EncryptionType::QuantumSafe, _) => Err(NovusPackError::security(
                crate::error::SecurityErrorKind::InvalidEncryptionType,
                format!("{} uses an unsupported encryption scheme", file.path),
            )),
        }
    }

    /// Sign a file entry with Ed25519
    pub fn sign_entry(&self, path: &str, key: &SigningKey) -> Result<()> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        let file = state
            .table
            .file_mut(&path)
            .ok_or_else(|| NovusPackError::not_found(path.clone()))?;
        let message = file.signing_message()?;
        file.security.signature = Some(SignatureBlock::sign(&message, key));
        file.bump_version();
        state.mark_dirty();
        debug!("Signed {}", path);
        Ok(())
    }

    /// Sign the whole package with Ed25519
    ///
    /// The signature covers the header flags and file count, the comment,
    /// and every entry record. It is stored as a special entry at
    /// [`PACKAGE_SIGNATURE_PATH`], replacing any earlier package signature.
    /// Any later mutation invalidates it until the package is signed again.
    pub fn sign_package(&self, key: &SigningKey) -> Result<()> {
        let mut state = self.write_state()?;
        if let Some(entry) = state.table.get(PACKAGE_SIGNATURE_PATH) {
            if !is_package_signature(entry) {
                return Err(NovusPackError::validation(
                    "path",
                    format!("'{}' is already used by another entry", PACKAGE_SIGNATURE_PATH),
                ));
            }
        }
        let previous: Vec<String> = state
            .table
            .iter()
            .filter(|e| is_package_signature(e))
            .map(|e| e.path().to_string())
            .collect();
        if previous.is_empty() {
            self.check_capacity(&state.table)?;
        }
        for old in &previous {
            state.table.remove(old)?;
        }

        // Same size as the real block, so the header does not move
        state.table.insert(Entry::File(FileEntry::new(
            PACKAGE_SIGNATURE_PATH.to_string(),
            type_codes::PACKAGE_SIGNATURE,
            SignatureBlock::placeholder().to_bytes(),
            self.config.checksum_algorithm,
        )))?;
        state.mark_dirty();

        let header = state.current_header()?;
        let message = package_signing_message(&header, &state.table, state.comment.as_deref())?;
        let block = SignatureBlock::sign(&message, key).to_bytes();
        let size = block.len() as u64;
        if let Some(file) = state.table.file_mut(PACKAGE_SIGNATURE_PATH) {
            file.replace_data(block, size);
        }
        state.mark_dirty();
        info!("Signed package ({} entries)", state.table.len());
        Ok(())
    }

    /// The package signature block, if the package is signed
    pub fn package_signature(&self) -> Result<Option<SignatureBlock>> {
        let state = self.state.read();
        let found = state
            .table
            .iter()
            .find(|e| is_package_signature(e))
            .and_then(Entry::as_file);
        match found {
            Some(file) => Ok(Some(SignatureBlock::from_bytes(&file.data)?)),
            None => Ok(None),
        }
    }

    // ---- metadata ----

    pub fn set_tag(&self, path: &str, key: &str, value: impl Into<TagValue>) -> Result<()> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        metadata::set_tag(&mut state.table, &path, key, value.into(), &self.config)?;
        state.mark_dirty();
        Ok(())
    }

    pub fn remove_tag(&self, path: &str, key: &str) -> Result<Option<TagValue>> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        let removed = metadata::remove_tag(&mut state.table, &path, key)?;
        if removed.is_some() {
            state.mark_dirty();
        }
        Ok(removed)
    }

    /// An entry's own tags
    pub fn get_tags(&self, path: &str) -> Result<TagMap> {
        let path = normalize_path(path)?;
        Ok(metadata::get_tags(&self.state.read().table, &path)?.clone())
    }

    pub fn get_tag(&self, path: &str, key: &str) -> Result<Option<TagValue>> {
        Ok(self.get_tags(path)?.get(key).cloned())
    }

    pub fn set_custom_metadata(&self, path: &str, key: &str, value: impl Into<TagValue>) -> Result<()> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        metadata::set_custom(&mut state.table, &path, key, value.into(), &self.config)?;
        state.mark_dirty();
        Ok(())
    }

    pub fn get_custom_metadata(&self, path: &str, key: &str) -> Result<Option<TagValue>> {
        let path = normalize_path(path)?;
        Ok(metadata::get_custom(&self.state.read().table, &path, key)?.cloned())
    }

    pub fn remove_custom_metadata(&self, path: &str, key: &str) -> Result<Option<TagValue>> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        let removed = metadata::remove_custom(&mut state.table, &path, key)?;
        if removed.is_some() {
            state.mark_dirty();
        }
        Ok(removed)
    }

    pub fn set_directory_metadata(&self, path: &str, meta: DirectoryMetadata) -> Result<()> {
        let path = normalize_path(path)?;
        let mut state = self.write_state()?;
        metadata::set_directory_metadata(&mut state.table, &path, meta, &self.config)?;
        state.mark_dirty();
        Ok(())
    }

    pub fn associate_file_with_directory(&self, file: &str, dir: &str) -> Result<()> {
        let file = normalize_path(file)?;
        let dir = normalize_path(dir)?;
        let mut state = self.write_state()?;
        metadata::associate_file_with_directory(&mut state.table, &file, &dir)?;
        state.mark_dirty();
        debug!("Associated {} with {}", file, dir);
        Ok(())
    }

    pub fn disassociate_file(&self, file: &str) -> Result<()> {
        let file = normalize_path(file)?;
        let mut state = self.write_state()?;
        metadata::disassociate_file(&mut state.table, &file)?;
        state.mark_dirty();
        Ok(())
    }

    /// Directory a file belongs to, if any
    pub fn owning_directory(&self, file: &str) -> Result<Option<String>> {
        let path = normalize_path(file)?;
        let state = self.state.read();
        let entry = state
            .table
            .file(&path)
            .ok_or_else(|| NovusPackError::not_found(path.clone()))?;
        Ok(metadata::owning_directory(&state.table, entry).map(str::to_string))
    }

    /// Member files of a directory, in table order
    pub fn directory_files(&self, dir: &str) -> Result<Vec<String>> {
        let dir = normalize_path(dir)?;
        let state = self.state.read();
        Ok(metadata::directory_files(&state.table, &dir)?
            .into_iter()
            .map(|f| f.path.clone())
            .collect())
    }

    /// Own tags merged with inherited directory tags
    pub fn effective_tags(&self, path: &str) -> Result<TagMap> {
        let path = normalize_path(path)?;
        let state = self.state.read();
        let file = state
            .table
            .file(&path)
            .ok_or_else(|| NovusPackError::not_found(path.clone()))?;
        Ok(inheritance::effective_tags(&state.table, file))
    }

    pub fn is_metadata_only(&self) -> bool {
        let state = self.state.read();
        metadata::is_metadata_only(&state.header, &state.table)
    }

    // ---- identity ----

    /// Vendor and application ids from the package info file, `(0, 0)` without one
    pub fn package_identity(&self) -> Result<(u32, u64)> {
        let state = self.state.read();
        let info = read_info(&state.table)?;
        Ok(info.map_or((0, 0), |(_, info)| (info.vendor_id, info.app_id)))
    }

    pub fn vendor_id(&self) -> Result<u32> {
        Ok(self.package_identity()?.0)
    }

    pub fn app_id(&self) -> Result<u64> {
        Ok(self.package_identity()?.1)
    }

    pub fn has_vendor_id(&self) -> Result<bool> {
        Ok(self.vendor_id()? != 0)
    }

    pub fn has_app_id(&self) -> Result<bool> {
        Ok(self.app_id()? != 0)
    }

    /// Set the vendor id; the package must already carry an info file
    pub fn set_vendor_id(&self, vendor_id: u32) -> Result<()> {
        self.update_info(|info| info.vendor_id = vendor_id)
    }

    pub fn set_app_id(&self, app_id: u64) -> Result<()> {
        self.update_info(|info| info.app_id = app_id)
    }

    pub fn set_package_identity(&self, vendor_id: u32, app_id: u64) -> Result<()> {
        self.update_info(|info| {
            info.vendor_id = vendor_id;
            info.app_id = app_id;
        })
    }

    /// Reset both ids to 0 (unset)
    pub fn clear_package_identity(&self) -> Result<()> {
        self.set_package_identity(0, 0)
    }

    fn update_info(&self, update: impl FnOnce(&mut PackageInfo)) -> Result<()> {
        let mut state = self.write_state()?;
        let (path, mut info) = read_info(&state.table)?.ok_or_else(|| {
            NovusPackError::validation("package_info", "package has no info file")
        })?;
        update(&mut info);
        let payload = SpecialFile::Info(info).to_payload()?;
        let size = payload.len() as u64;
        if let Some(file) = state.table.file_mut(&path) {
            file.replace_data(payload, size);
        }
        state.mark_dirty();
        debug!("Updated package identity in {}", path);
        Ok(())
    }

    // ---- queries ----

    /// Files whose effective tags contain `key == value`
    pub fn get_files_by_tag(&self, key: &str, value: &TagValue) -> Result<Vec<FileEntry>> {
        self.query_by_tag(key, value, None)
    }

    pub fn get_files_by_tag_cancellable(
        &self,
        key: &str,
        value: &TagValue,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileEntry>> {
        self.query_by_tag(key, value, Some(cancel))
    }

    fn query_by_tag(
        &self,
        key: &str,
        value: &TagValue,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<FileEntry>> {
        let state = self.state.read();
        Ok(query::get_files_by_tag(&state.table, key, value, cancel)?
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn get_files_with_tag_key(&self, key: &str) -> Result<Vec<FileEntry>> {
        self.query_by_key(key, None)
    }

    pub fn get_files_with_tag_key_cancellable(
        &self,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileEntry>> {
        self.query_by_key(key, Some(cancel))
    }

    fn query_by_key(&self, key: &str, cancel: Option<&CancellationToken>) -> Result<Vec<FileEntry>> {
        let state = self.state.read();
        Ok(query::get_files_with_tag_key(&state.table, key, cancel)?
            .into_iter()
            .cloned()
            .collect())
    }

    // ---- validation ----

    /// Run every check and return the full report
    pub fn validate(&self, options: &ValidationOptions) -> Result<ValidationReport> {
        let state = self.state.read();
        let header = state.current_header()?;
        let report = validator::validate(state.view(&header), options)?;
        if !report.is_valid() {
            warn!("Package failed validation with {} failures", report.failures.len());
        }
        Ok(report)
    }

    /// Validate and convert a failing report into a corruption error
    pub fn verify(&self, options: &ValidationOptions) -> Result<SecurityStatus> {
        self.validate(options)?.into_result()
    }
}

fn parse_special(file: &FileEntry) -> Result<SpecialFile> {
    if file.is_encrypted() {
        return Err(NovusPackError::validation(
            "type_code",
            format!("special file {} is encrypted", file.path),
        ));
    }
    SpecialFile::from_payload(file.type_code, &file.data)
}

/// Path and parsed contents of the package info file
fn read_info(table: &EntryTable) -> Result<Option<(String, PackageInfo)>> {
    let found = table
        .files()
        .find(|f| f.type_code == type_codes::PACKAGE_INFO);
    let Some(file) = found else {
        return Ok(None);
    };
    match parse_special(file)? {
        SpecialFile::Info(info) => Ok(Some((file.path.clone(), info))),
        other => Err(NovusPackError::validation(
            "package_info",
            format!("{} holds special file type {}", file.path, other.type_code()),
        )),
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

/// Builder for creating packages with custom configuration
pub struct PackageBuilder {
    config: PackageConfig,
    path: Option<PathBuf>,
    comment: Option<String>,
    rules: Vec<Box<dyn EncryptionRule>>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        PackageBuilder {
            config: PackageConfig::default(),
            path: None,
            comment: None,
            rules: Vec::new(),
        }
    }

    pub fn config(mut self, config: PackageConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_comment_length(mut self, len: usize) -> Self {
        self.config.max_comment_length = len;
        self
    }

    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = max;
        self
    }

    pub fn checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.config.checksum_algorithm = algorithm;
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Backing file; the empty package is written there on build
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Extra encryption rule, run after the built-in ones
    pub fn encryption_rule<R: EncryptionRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn build(self) -> Result<Package> {
        let mut package = Package::create(self.config)?;
        for rule in self.rules {
            package.rules.add_rule(rule);
        }
        if let Some(comment) = self.comment {
            package.set_comment(&comment)?;
        }
        if let Some(path) = self.path {
            info!("Building package at {:?}", path);
            package.save(&path)?;
            package.path = Some(path);
        }
        Ok(package)
    }
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SecurityErrorKind;
    use crate::security::encryption::generate_key;
    use crate::security::EncryptionStatus;

    fn package() -> Package {
        Package::create(PackageConfig::default()).unwrap()
    }

    #[test]
    fn test_add_and_read_file() {
        let pkg = package();
        let path = pkg.add_file("docs\\readme.txt", b"hello".to_vec()).unwrap();
        assert_eq!(path, "/docs/readme.txt");
        assert_eq!(pkg.read_file("/docs/readme.txt", None).unwrap(), b"hello");
        assert_eq!(pkg.header().unwrap().file_count, 1);
    }

    #[test]
    fn test_add_rejects_bad_paths_and_collisions() {
        let pkg = package();
        pkg.add_file("a/b.txt", Vec::new()).unwrap();
        for bad in ["", "   ", "/a/./b.txt", "a//b.txt"] {
            assert!(
                matches!(pkg.add_file(bad, Vec::new()), Err(NovusPackError::Validation { .. })),
                "{bad:?}"
            );
        }
        assert_eq!(pkg.len(), 1);
    }

    #[test]
    fn test_missing_payload_rejected() {
        let pkg = package();
        let options = FileOptions {
            data: None,
            ..FileOptions::default()
        };
        assert!(matches!(
            pkg.add_file_with("/x", options),
            Err(NovusPackError::Validation { .. })
        ));
        assert!(pkg.is_empty());
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let pkg = package();
        pkg.add_file("/a", b"1".to_vec()).unwrap();
        let pkg = pkg.into_read_only();

        assert!(matches!(pkg.add_file("/b", Vec::new()), Err(NovusPackError::ReadOnly)));
        assert!(matches!(pkg.set_comment("x"), Err(NovusPackError::ReadOnly)));
        assert!(matches!(pkg.set_tag("/a", "k", 1i64), Err(NovusPackError::ReadOnly)));
        assert!(matches!(pkg.clear_comment(), Err(NovusPackError::ReadOnly)));
        assert!(pkg.read_file("/a", None).is_ok());
    }

    #[test]
    fn test_comment_lifecycle() {
        let pkg = package();
        assert!(!pkg.has_comment());
        pkg.set_comment("Build 42").unwrap();
        assert_eq!(pkg.get_comment(), "Build 42");
        let header = pkg.header().unwrap();
        assert_eq!(header.comment_size, 8);
        assert!(header.has_comment());

        pkg.clear_comment().unwrap();
        pkg.clear_comment().unwrap();
        assert_eq!(pkg.get_comment(), "");
        let header = pkg.header().unwrap();
        assert_eq!((header.comment_size, header.comment_start), (0, 0));
    }

    #[test]
    fn test_rejected_comment_keeps_previous() {
        let pkg = PackageBuilder::new().max_comment_length(16).build().unwrap();
        pkg.set_comment("keep me").unwrap();

        assert!(matches!(
            pkg.set_comment(&"x".repeat(17)),
            Err(NovusPackError::Length { .. })
        ));
        for bad in ["<script>", "a\x07"] {
            let err = pkg.set_comment(bad).unwrap_err();
            assert_eq!(err.security_kind(), Some(SecurityErrorKind::InjectionPattern), "{bad:?}");
        }
        assert!(matches!(
            pkg.set_comment_bytes(&[0xFF, 0xFE]),
            Err(NovusPackError::Encoding(_))
        ));
        assert_eq!(pkg.get_comment(), "keep me");
    }

    #[test]
    fn test_encrypted_file() {
        let pkg = package();
        let key = generate_key();
        pkg.add_file_with("/secret.bin", FileOptions::new(b"classified".to_vec()).encrypt_with(key))
            .unwrap();

        let file = pkg.file("/secret.bin").unwrap();
        assert!(file.is_encrypted());
        assert_eq!(file.size, 10);
        assert_ne!(file.data, b"classified");

        assert_eq!(pkg.read_file("/secret.bin", Some(&key)).unwrap(), b"classified");
        assert!(pkg.read_file("/secret.bin", None).is_err());

        let report = pkg.validate(&ValidationOptions::new()).unwrap();
        assert_eq!(report.status.encryption_status, EncryptionStatus::KeyNotProvided);
        assert!(report.is_valid());

        let report = pkg.validate(&ValidationOptions::new().with_key(key)).unwrap();
        assert_eq!(report.status.encryption_status, EncryptionStatus::Verified);

        let report = pkg
            .validate(&ValidationOptions::new().with_key(generate_key()))
            .unwrap();
        assert_eq!(report.status.encryption_status, EncryptionStatus::Failed);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_weak_key_rejected_on_add() {
        let pkg = package();
        let err = pkg
            .add_file_with("/s", FileOptions::new(b"x".to_vec()).encrypt_with([0u8; 32]))
            .unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::InvalidEncryptionKey));
        assert!(pkg.is_empty());
    }

    #[test]
    fn test_remove_directory_clears_associations() {
        let pkg = package();
        pkg.add_directory("/shared").unwrap();
        pkg.add_file("/a.txt", Vec::new()).unwrap();
        pkg.associate_file_with_directory("/a.txt", "/shared").unwrap();
        assert_eq!(pkg.owning_directory("/a.txt").unwrap().as_deref(), Some("/shared"));

        pkg.remove_entry("/shared").unwrap();
        assert_eq!(pkg.owning_directory("/a.txt").unwrap(), None);
        assert!(pkg.validate(&ValidationOptions::new()).unwrap().is_valid());
    }

    #[test]
    fn test_special_files_and_metadata_only() {
        let pkg = package();
        pkg.add_special_file(&SpecialFile::InstallScript("echo hi".into()))
            .unwrap();
        assert!(pkg.is_metadata_only());
        assert_eq!(pkg.header().unwrap().file_count, 0);
        assert_eq!(
            pkg.special_file(type_codes::INSTALL_SCRIPT).unwrap(),
            Some(SpecialFile::InstallScript("echo hi".into()))
        );
        assert_eq!(pkg.special_file(type_codes::PACKAGE_INFO).unwrap(), None);

        pkg.add_file("/data.bin", vec![1]).unwrap();
        assert!(!pkg.is_metadata_only());
    }

    #[test]
    fn test_sign_entry() {
        let pkg = package();
        pkg.add_file("/a", b"x".to_vec()).unwrap();
        let key = SigningKey::from_bytes(&[11u8; 32]);
        pkg.sign_entry("/a", &key).unwrap();

        let status = pkg
            .verify(&ValidationOptions::new().trust(&key.verifying_key()))
            .unwrap();
        assert!(status.signature_valid);
        assert_eq!(pkg.stats().signed_file_count, 1);
    }

    #[test]
    fn test_comment_digest_follows_comment() {
        let pkg = package();
        assert_eq!(pkg.comment_digest(), None);
        pkg.set_comment("notes\r\n").unwrap();
        assert_eq!(pkg.comment_digest(), Some(comment_digest("notes\n")));

        let loaded = Package::from_bytes(&pkg.to_bytes().unwrap(), AccessMode::ReadOnly).unwrap();
        assert_eq!(loaded.comment_digest(), pkg.comment_digest());

        pkg.clear_comment().unwrap();
        assert_eq!(pkg.comment_digest(), None);
    }

    #[test]
    fn test_read_file_detects_corrupt_payload() {
        let pkg = package();
        pkg.add_file("/a", b"payload".to_vec()).unwrap();
        pkg.state.write().table.file_mut("/a").unwrap().data[0] ^= 0x01;

        let err = pkg.read_file("/a", None).unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::ChecksumMismatch));
    }

    #[test]
    fn test_lookup_by_type_and_checksum() {
        let pkg = package();
        pkg.add_file_with("/a.png", FileOptions::new(b"img".to_vec()).type_code(7))
            .unwrap();
        pkg.add_file_with("/b.png", FileOptions::new(b"other".to_vec()).type_code(7))
            .unwrap();
        pkg.add_file("/c.txt", b"img".to_vec()).unwrap();

        let pngs: Vec<String> = pkg
            .find_entries_by_type(7)
            .iter()
            .map(|e| e.path().to_string())
            .collect();
        assert_eq!(pngs, vec!["/a.png", "/b.png"]);
        assert!(pkg.find_entries_by_type(9).is_empty());

        let checksum = Checksum::compute(ChecksumAlgorithm::Sha256, b"img");
        assert_eq!(pkg.file_by_checksum(&checksum).unwrap().path, "/a.png");
        // Same bytes under another algorithm do not match
        let crc = Checksum::compute(ChecksumAlgorithm::Crc32, b"img");
        assert!(pkg.file_by_checksum(&crc).is_none());
    }

    #[test]
    fn test_path_hierarchy() {
        let pkg = package();
        for dir in ["/assets", "/assets/audio", "/assets/images", "/docs"] {
            pkg.add_directory(dir).unwrap();
        }
        pkg.add_file("/assets/audio/step.ogg", Vec::new()).unwrap();

        let tree = pkg.path_hierarchy();
        assert_eq!(tree["/"], vec!["/assets", "/docs"]);
        assert_eq!(tree["/assets"], vec!["/assets/audio", "/assets/images"]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_package_identity() {
        let pkg = package();
        assert_eq!(pkg.package_identity().unwrap(), (0, 0));
        assert!(matches!(
            pkg.set_vendor_id(42),
            Err(NovusPackError::Validation { .. })
        ));

        let info = PackageInfo {
            name: "terrain".into(),
            version: semver::Version::new(1, 0, 0),
            vendor_id: 0,
            app_id: 0,
            description: None,
            created: chrono::Utc::now(),
        };
        pkg.add_special_file(&SpecialFile::Info(info)).unwrap();
        assert!(!pkg.has_vendor_id().unwrap());

        pkg.set_vendor_id(42).unwrap();
        pkg.set_app_id(0x1234_5678_9ABC).unwrap();
        assert_eq!(pkg.package_identity().unwrap(), (42, 0x1234_5678_9ABC));
        assert!(pkg.has_app_id().unwrap());
        assert!(pkg.validate(&ValidationOptions::new()).unwrap().is_valid());

        let loaded = Package::from_bytes(&pkg.to_bytes().unwrap(), AccessMode::Writable).unwrap();
        assert_eq!(loaded.vendor_id().unwrap(), 42);
        loaded.clear_package_identity().unwrap();
        assert_eq!(loaded.package_identity().unwrap(), (0, 0));
        match loaded.special_file(type_codes::PACKAGE_INFO).unwrap() {
            Some(SpecialFile::Info(info)) => assert_eq!(info.name, "terrain"),
            other => panic!("unexpected special file: {:?}", other),
        }
    }

    #[test]
    fn test_sign_package_is_metadata_neutral() {
        let pkg = package();
        pkg.add_special_file(&SpecialFile::InstallScript("true".into()))
            .unwrap();
        let key = SigningKey::from_bytes(&[12u8; 32]);
        pkg.sign_package(&key).unwrap();

        assert!(pkg.is_metadata_only());
        assert_eq!(pkg.header().unwrap().file_count, 0);
        assert!(pkg
            .verify(&ValidationOptions::new().trust(&key.verifying_key()))
            .unwrap()
            .signature_valid);
    }

    #[test]
    fn test_capacity_limit() {
        let pkg = PackageBuilder::new().max_entries(1).build().unwrap();
        pkg.add_file("/a", Vec::new()).unwrap();
        assert!(matches!(
            pkg.add_directory("/d"),
            Err(NovusPackError::Length { .. })
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let pkg = package();
        pkg.add_directory("/textures").unwrap();
        pkg.add_file("/textures/wall.png", vec![9; 32]).unwrap();
        pkg.set_tag("/textures", "category", "texture").unwrap();
        pkg.set_comment("Build 42").unwrap();

        let bytes = pkg.to_bytes().unwrap();
        let loaded = Package::from_bytes(&bytes, AccessMode::ReadOnly).unwrap();
        assert_eq!(loaded.get_comment(), "Build 42");
        assert_eq!(loaded.paths(), pkg.paths());
        assert_eq!(loaded.to_bytes().unwrap(), bytes);
        assert!(loaded.validate(&ValidationOptions::new()).unwrap().is_valid());
    }
}
