//! Error types for NovusPack operations

use std::fmt;
use thiserror::Error;

/// Kind of security violation carried by [`NovusPackError::Security`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SecurityErrorKind {
    /// Control characters or script-like markers in untrusted text
    InjectionPattern,
    /// Stored checksum does not match the recomputed content checksum
    ChecksumMismatch,
    /// Signature block failed verification
    SignatureMismatch,
    /// Signature was made by a key outside the trusted set
    UntrustedSigner,
    /// Unknown or unsupported encryption type
    InvalidEncryptionType,
    /// Key material rejected by an encryption rule
    InvalidEncryptionKey,
    /// Payload rejected by an encryption rule
    InvalidEncryptionData,
    /// Authenticated decryption failed
    DecryptionFailed,
}

impl fmt::Display for SecurityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityErrorKind::InjectionPattern => "injection pattern",
            SecurityErrorKind::ChecksumMismatch => "checksum mismatch",
            SecurityErrorKind::SignatureMismatch => "signature mismatch",
            SecurityErrorKind::UntrustedSigner => "untrusted signer",
            SecurityErrorKind::InvalidEncryptionType => "invalid encryption type",
            SecurityErrorKind::InvalidEncryptionKey => "invalid encryption key",
            SecurityErrorKind::InvalidEncryptionData => "invalid encryption data",
            SecurityErrorKind::DecryptionFailed => "decryption failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum NovusPackError {
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("{field} length {actual} exceeds maximum of {max} bytes")]
    Length {
        field: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("Security error ({kind}): {detail}")]
    Security {
        kind: SecurityErrorKind,
        detail: String,
    },

    #[error("Entry not found: {path}")]
    NotFound { path: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Package is open read-only")]
    ReadOnly,

    #[error("Corruption at {path} (offset {offset}): {reason}")]
    Corruption {
        path: String,
        offset: u64,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl NovusPackError {
    /// Shorthand for a [`NovusPackError::Validation`] error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        NovusPackError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`NovusPackError::Security`] error
    pub fn security(kind: SecurityErrorKind, detail: impl Into<String>) -> Self {
        NovusPackError::Security {
            kind,
            detail: detail.into(),
        }
    }

    /// Shorthand for a [`NovusPackError::NotFound`] error
    pub fn not_found(path: impl Into<String>) -> Self {
        NovusPackError::NotFound { path: path.into() }
    }

    /// Security kind, if this is a security error
    pub fn security_kind(&self) -> Option<SecurityErrorKind> {
        match self {
            NovusPackError::Security { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for NovusPackError {
    fn from(err: toml::de::Error) -> Self {
        NovusPackError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for NovusPackError {
    fn from(err: validator::ValidationErrors) -> Self {
        NovusPackError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, NovusPackError>;
