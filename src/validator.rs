//! Package validation
//!
//! Checks run in a fixed order and every failure is collected:
//!
//! 1. Structure: header invariants, file count, paths, associations
//! 2. Checksums over the stored bytes of every file
//! 3. Signatures: entry signatures and the package signature, when present
//! 4. Encryption, only when a key is supplied
//!
//! The verdict is composed into a [`SecurityStatus`]. Checks that did not
//! run (no signatures, no key, unsupported scheme) never fail the package.

use crate::cancel::CancellationToken;
use crate::catalog::{Entry, EntryTable, FileEntry};
use crate::comment::sanitize_comment;
use crate::error::{NovusPackError, Result};
use crate::header::{flags, PackageHeader, HEADER_SIZE};
use crate::io::{decode_package, feature_flags};
use crate::path::{normalize_path, parent_path};
use crate::security::encryption::{decrypt, EncryptionKey};
use crate::error::SecurityErrorKind;
use crate::security::{
    is_package_signature, package_signing_message, EncryptionStatus, EncryptionType,
    EncryptionValidator, SecurityStatus, SignatureBlock, ValidationAspect, ValidationFailure,
    ValidationReport,
};
use crate::tag::{validate_tag_key, TagMap};
use ahash::AHashSet;
use ed25519_dalek::VerifyingKey;
use tracing::{debug, info, warn};

const HEADER_LOCATION: &str = "<header>";
const COMMENT_LOCATION: &str = "<comment>";

/// Inputs that change what validation checks
#[derive(Debug, Default)]
pub struct ValidationOptions {
    /// Decryption key; without it encrypted entries are not checked
    pub key: Option<EncryptionKey>,
    /// When set, signatures from other keys fail as untrusted
    pub trusted_keys: Option<AHashSet<[u8; 32]>>,
    /// Rules run before each decryption; defaults to the built-in set
    pub encryption_validator: Option<EncryptionValidator>,
    pub cancel: Option<CancellationToken>,
}

impl ValidationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key: EncryptionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Add a key to the trusted signer set
    pub fn trust(mut self, key: &VerifyingKey) -> Self {
        self.trusted_keys
            .get_or_insert_with(AHashSet::new)
            .insert(key.to_bytes());
        self
    }

    pub fn with_encryption_validator(mut self, validator: EncryptionValidator) -> Self {
        self.encryption_validator = Some(validator);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        match &self.cancel {
            Some(token) => token.check(),
            None => Ok(()),
        }
    }
}

/// Borrowed view of the package parts under validation
#[derive(Debug, Clone, Copy)]
pub struct PackageView<'a> {
    pub header: &'a PackageHeader,
    pub table: &'a EntryTable,
    pub comment: Option<&'a str>,
}

struct Collector {
    failures: Vec<ValidationFailure>,
}

impl Collector {
    fn fail(&mut self, path: &str, offset: u64, aspect: ValidationAspect, error: impl Into<String>) {
        let error = error.into();
        warn!("{} check failed for {} at offset {}: {}", aspect, path, offset, error);
        self.failures.push(ValidationFailure {
            path: path.to_string(),
            offset,
            aspect,
            error,
        });
    }

    fn count(&self, aspect: ValidationAspect) -> usize {
        self.failures.iter().filter(|f| f.aspect == aspect).count()
    }
}

/// Validate a package
///
/// Returns `Err` only for cancellation or an unencodable table; check
/// failures are reported in the [`ValidationReport`].
pub fn validate(view: PackageView<'_>, options: &ValidationOptions) -> Result<ValidationReport> {
    let offsets = view.table.record_offsets(HEADER_SIZE as u64)?;
    let mut collector = Collector {
        failures: Vec::new(),
    };

    check_structure(view, &offsets, options, &mut collector)?;
    let structure_valid = collector.count(ValidationAspect::Structure) == 0;

    check_checksums(view.table, &offsets, options, &mut collector)?;
    let checksum_valid = collector.count(ValidationAspect::Checksum) == 0;

    check_signatures(view, &offsets, options, &mut collector)?;
    let signature_valid = collector.count(ValidationAspect::Signature) == 0;

    let encryption_status = check_encryption(view.table, &offsets, options, &mut collector)?;

    let status = SecurityStatus::compose(
        structure_valid,
        checksum_valid,
        signature_valid,
        encryption_status,
    );

    info!(
        "Validation verdict: overall={} structure={} checksums={} signatures={} encryption={} ({} failures)",
        status.overall,
        status.structure_valid,
        status.checksum_valid,
        status.signature_valid,
        status.encryption_status,
        collector.failures.len()
    );

    Ok(ValidationReport {
        status,
        failures: collector.failures,
    })
}

/// Decode a package stream and validate it as stored
///
/// Framing errors (truncation, bad record syntax) are returned as `Err`
/// since there is no table to report against.
pub fn validate_bytes(bytes: &[u8], options: &ValidationOptions) -> Result<ValidationReport> {
    let decoded = decode_package(bytes)?;
    debug!("Validating {} byte stream with {} entries", bytes.len(), decoded.table.len());
    validate(
        PackageView {
            header: &decoded.header,
            table: &decoded.table,
            comment: decoded.comment.as_deref(),
        },
        options,
    )
}

fn check_tags(tags: &TagMap) -> std::result::Result<(), String> {
    for (key, value) in tags {
        validate_tag_key(key).map_err(|e| e.to_string())?;
        value.validate(usize::MAX).map_err(|e| format!("tag '{}': {}", key, e))?;
    }
    Ok(())
}

fn check_structure(
    view: PackageView<'_>,
    offsets: &[u64],
    options: &ValidationOptions,
    c: &mut Collector,
) -> Result<()> {
    use crate::security::ValidationAspect::Structure;

    let header = view.header;
    let table = view.table;

    if let Err(e) = header.validate() {
        c.fail(HEADER_LOCATION, 0, Structure, e.to_string());
    }

    let ordinary = table.ordinary_file_count();
    if header.file_count as usize != ordinary {
        c.fail(
            HEADER_LOCATION,
            4,
            Structure,
            format!(
                "file_count is {} but the table holds {} ordinary files",
                header.file_count, ordinary
            ),
        );
    }

    let comment = view.comment.filter(|text| !text.is_empty());
    if header.has_comment() != comment.is_some()
        || comment.map_or(0, str::len) != header.comment_size as usize
    {
        c.fail(
            HEADER_LOCATION,
            8,
            Structure,
            format!(
                "comment_size is {} but the comment blob holds {} bytes",
                header.comment_size,
                comment.map_or(0, str::len)
            ),
        );
    }

    if let Some(text) = comment {
        match sanitize_comment(text, usize::MAX) {
            Ok(clean) if clean.as_str() == text => {}
            Ok(_) => c.fail(
                COMMENT_LOCATION,
                header.comment_start,
                Structure,
                "comment line endings are not normalized",
            ),
            Err(e) => c.fail(COMMENT_LOCATION, header.comment_start, Structure, e.to_string()),
        }
    }

    let expected = feature_flags(header, table, header.has_comment());
    let actual = header.flags
        & flags::MASK_FEATURES
        & !(flags::HAS_COMPRESSED_FILES | flags::HAS_EXTENDED_ATTRS);
    if actual != expected {
        c.fail(
            HEADER_LOCATION,
            0,
            Structure,
            format!(
                "feature flags 0x{:02X} do not match table contents 0x{:02X}",
                actual, expected
            ),
        );
    }

    let mut package_signatures = 0usize;
    for (entry, &offset) in table.iter().zip(offsets) {
        options.check_cancel()?;
        let path = entry.path();

        if is_package_signature(entry) {
            package_signatures += 1;
            if package_signatures > 1 {
                c.fail(path, offset, Structure, "more than one package signature entry");
            }
        }

        match normalize_path(path) {
            Ok(normalized) if normalized == path => {}
            Ok(normalized) => c.fail(
                path,
                offset,
                Structure,
                format!("path is not normalized (expected '{}')", normalized),
            ),
            Err(e) => c.fail(path, offset, Structure, e.to_string()),
        }

        if let Err(e) = check_tags(entry.tags()) {
            c.fail(path, offset, Structure, e);
        }

        match entry {
            Entry::File(f) => check_file_structure(table, f, offset, c),
            Entry::Directory(d) => {
                if d.parent.as_deref() != parent_path(&d.path) {
                    c.fail(
                        path,
                        offset,
                        Structure,
                        format!(
                            "recorded parent {:?} does not match the path",
                            d.parent
                        ),
                    );
                }
            }
        }
    }

    Ok(())
}

fn check_file_structure(table: &EntryTable, file: &FileEntry, offset: u64, c: &mut Collector) {
    use crate::security::ValidationAspect::Structure;

    // The package signature does not cover its own record
    if file.type_code == crate::catalog::type_codes::PACKAGE_SIGNATURE
        && (file.directory.is_some()
            || !file.tags.is_empty()
            || !file.custom.is_empty()
            || file.is_encrypted()
            || file.security.is_signed())
    {
        c.fail(
            &file.path,
            offset,
            Structure,
            "package signature entry carries metadata of its own",
        );
    }

    if let Some(dir) = file.directory.as_deref() {
        if table.directory(dir).is_none() {
            c.fail(
                &file.path,
                offset,
                Structure,
                format!("associated directory '{}' does not exist", dir),
            );
        }
    }

    if let Err(e) = check_tags(&file.custom) {
        c.fail(&file.path, offset, Structure, format!("custom metadata: {}", e));
    }

    if !file.is_encrypted() && file.size != file.data.len() as u64 {
        c.fail(
            &file.path,
            offset,
            Structure,
            format!(
                "recorded size {} does not match {} stored bytes",
                file.size,
                file.data.len()
            ),
        );
    }
}

fn check_checksums(
    table: &EntryTable,
    offsets: &[u64],
    options: &ValidationOptions,
    c: &mut Collector,
) -> Result<()> {
    for (entry, &offset) in table.iter().zip(offsets) {
        options.check_cancel()?;
        let Entry::File(file) = entry else { continue };

        if let Err(e) = file.security.checksum.verify(&file.data) {
            c.fail(&file.path, offset, ValidationAspect::Checksum, e.to_string());
        }
    }
    Ok(())
}

fn untrusted(signature: &SignatureBlock, options: &ValidationOptions) -> Option<String> {
    let trusted = options.trusted_keys.as_ref()?;
    if trusted.contains(&signature.public_key) {
        return None;
    }
    Some(
        NovusPackError::security(
            SecurityErrorKind::UntrustedSigner,
            "signing key is not in the trusted set",
        )
        .to_string(),
    )
}

fn check_signatures(
    view: PackageView<'_>,
    offsets: &[u64],
    options: &ValidationOptions,
    c: &mut Collector,
) -> Result<()> {
    use crate::security::ValidationAspect::Signature;

    let mut checked = 0usize;
    for (entry, &offset) in view.table.iter().zip(offsets) {
        options.check_cancel()?;
        let Entry::File(file) = entry else { continue };

        if is_package_signature(entry) {
            checked += 1;
            let block = match SignatureBlock::from_bytes(&file.data) {
                Ok(block) => block,
                Err(e) => {
                    c.fail(&file.path, offset, Signature, e.to_string());
                    continue;
                }
            };
            let comment = view.comment.filter(|text| !text.is_empty());
            let message = package_signing_message(view.header, view.table, comment)?;
            if let Err(e) = block.verify(&message) {
                c.fail(HEADER_LOCATION, 0, Signature, format!("package signature: {}", e));
            } else if let Some(e) = untrusted(&block, options) {
                c.fail(HEADER_LOCATION, 0, Signature, format!("package signature: {}", e));
            }
            continue;
        }

        let Some(signature) = &file.security.signature else { continue };
        checked += 1;

        let message = file.signing_message()?;
        if let Err(e) = signature.verify(&message) {
            c.fail(&file.path, offset, Signature, e.to_string());
        } else if let Some(e) = untrusted(signature, options) {
            c.fail(&file.path, offset, Signature, e);
        }
    }

    if checked == 0 {
        debug!("No signatures present; signature check skipped");
    }
    Ok(())
}

fn check_encryption(
    table: &EntryTable,
    offsets: &[u64],
    options: &ValidationOptions,
    c: &mut Collector,
) -> Result<EncryptionStatus> {
    let encrypted: Vec<(&FileEntry, u64)> = table
        .iter()
        .zip(offsets.iter().copied())
        .filter_map(|(e, o)| e.as_file().filter(|f| f.is_encrypted()).map(|f| (f, o)))
        .collect();

    if encrypted.is_empty() {
        return Ok(EncryptionStatus::None);
    }

    let Some(key) = options.key.as_ref() else {
        debug!(
            "{} encrypted entries present but no key supplied",
            encrypted.len()
        );
        return Ok(EncryptionStatus::KeyNotProvided);
    };

    let default_rules;
    let rules = match &options.encryption_validator {
        Some(v) => v,
        None => {
            default_rules = EncryptionValidator::default();
            &default_rules
        }
    };

    let mut failed = false;
    let mut unsupported = false;
    let mut key_checked = false;

    for (file, offset) in encrypted {
        options.check_cancel()?;

        match file.security.encryption {
            EncryptionType::Aes256Gcm => {}
            EncryptionType::QuantumSafe => {
                debug!("{} uses {}; not checked", file.path, EncryptionType::QuantumSafe);
                unsupported = true;
                continue;
            }
            EncryptionType::None => continue,
        }

        if !key_checked {
            key_checked = true;
            if let Err(e) = rules.validate_encryption_key(key, EncryptionType::Aes256Gcm) {
                c.fail(&file.path, offset, ValidationAspect::Encryption, e.to_string());
                return Ok(EncryptionStatus::Failed);
            }
        }

        let outcome = rules
            .validate_decryption_data(&file.data, EncryptionType::Aes256Gcm)
            .and_then(|_| decrypt(&file.data, key))
            .and_then(|plain| {
                if plain.len() as u64 == file.size {
                    Ok(())
                } else {
                    Err(NovusPackError::validation(
                        "size",
                        format!(
                            "decrypted {} bytes but entry records {}",
                            plain.len(),
                            file.size
                        ),
                    ))
                }
            });

        if let Err(e) = outcome {
            c.fail(&file.path, offset, ValidationAspect::Encryption, e.to_string());
            failed = true;
        }
    }

    Ok(if failed {
        EncryptionStatus::Failed
    } else if unsupported {
        EncryptionStatus::Unsupported
    } else {
        EncryptionStatus::Verified
    })
}
