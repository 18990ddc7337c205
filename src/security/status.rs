//! Validation verdicts

use crate::error::NovusPackError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the encryption check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionStatus {
    /// No entry is encrypted
    None,
    /// Encrypted entries exist but no key was supplied
    KeyNotProvided,
    /// Every encrypted entry decrypted and matched its recorded size
    Verified,
    /// At least one encrypted entry failed
    Failed,
    /// Encrypted entries use a scheme this crate cannot check
    Unsupported,
}

impl EncryptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionStatus::None => "none",
            EncryptionStatus::KeyNotProvided => "key-not-provided",
            EncryptionStatus::Verified => "verified",
            EncryptionStatus::Failed => "failed",
            EncryptionStatus::Unsupported => "unsupported",
        }
    }

    /// Only a check that actually ran and failed counts against the verdict
    pub fn is_failure(self) -> bool {
        self == EncryptionStatus::Failed
    }
}

impl fmt::Display for EncryptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated security verdict for a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityStatus {
    pub structure_valid: bool,
    pub signature_valid: bool,
    pub checksum_valid: bool,
    pub encryption_status: EncryptionStatus,
    pub overall: bool,
}

impl SecurityStatus {
    pub(crate) fn compose(
        structure_valid: bool,
        checksum_valid: bool,
        signature_valid: bool,
        encryption_status: EncryptionStatus,
    ) -> Self {
        SecurityStatus {
            structure_valid,
            signature_valid,
            checksum_valid,
            encryption_status,
            overall: structure_valid
                && checksum_valid
                && signature_valid
                && !encryption_status.is_failure(),
        }
    }
}

/// Which check produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationAspect {
    Structure,
    Checksum,
    Signature,
    Encryption,
}

impl fmt::Display for ValidationAspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValidationAspect::Structure => "structure",
            ValidationAspect::Checksum => "checksum",
            ValidationAspect::Signature => "signature",
            ValidationAspect::Encryption => "encryption",
        })
    }
}

/// A single failed check, located by entry path and byte offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Entry path, or `"<header>"` for package-level problems
    pub path: String,
    /// Start offset of the entry record in the encoded package
    pub offset: u64,
    pub aspect: ValidationAspect,
    pub error: String,
}

/// Result of [`crate::validator::validate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: SecurityStatus,
    /// All failures, in check order then entry table order
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.status.overall
    }

    pub fn first_failure(&self) -> Option<&ValidationFailure> {
        self.failures.first()
    }

    pub fn failures_for(&self, aspect: ValidationAspect) -> impl Iterator<Item = &ValidationFailure> {
        self.failures.iter().filter(move |f| f.aspect == aspect)
    }

    /// `Ok(status)` when the package is valid, otherwise a
    /// [`NovusPackError::Corruption`] naming the first failure
    pub fn into_result(self) -> crate::error::Result<SecurityStatus> {
        if self.status.overall {
            return Ok(self.status);
        }
        match self.failures.into_iter().next() {
            Some(f) => Err(NovusPackError::Corruption {
                path: f.path,
                offset: f.offset,
                reason: format!("{}: {}", f.aspect, f.error),
            }),
            None => Err(NovusPackError::Corruption {
                path: "<package>".to_string(),
                offset: 0,
                reason: "validation failed".to_string(),
            }),
        }
    }
}
