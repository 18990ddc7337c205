//! Security envelope: checksums, signatures, encryption, and verdicts

pub mod checksum;
pub mod encryption;
pub mod rules;
pub mod signature;
pub mod status;

pub use checksum::{Checksum, ChecksumAlgorithm};
pub use encryption::{
    encryption_type_name, is_valid_encryption_type, EncryptionKey, EncryptionType,
};
pub use rules::{EncryptionRule, EncryptionValidator, FnRule, RuleSubject};
pub use signature::{
    is_package_signature, package_signing_message, SignatureAlgorithm, SignatureBlock,
    SigningMessage, PACKAGE_SIGNATURE_PATH,
};
pub use status::{
    EncryptionStatus, SecurityStatus, ValidationAspect, ValidationFailure, ValidationReport,
};

use serde::{Deserialize, Serialize};

/// Per-file security metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetadata {
    /// Checksum over the stored bytes
    pub checksum: Checksum,
    pub signature: Option<SignatureBlock>,
    pub encryption: EncryptionType,
}

impl SecurityMetadata {
    pub fn for_payload(algorithm: ChecksumAlgorithm, stored: &[u8], encryption: EncryptionType) -> Self {
        SecurityMetadata {
            checksum: Checksum::compute(algorithm, stored),
            signature: None,
            encryption,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}
