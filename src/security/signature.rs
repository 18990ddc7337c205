//! Ed25519 signatures
//!
//! Two kinds of signature share one block format:
//!
//! - An entry signature sits in a file record and covers that record's
//!   path, type code, size, directory association, tags, custom bag,
//!   checksum, and encryption type.
//! - The package signature is the payload of a special entry with type
//!   [`PACKAGE_SIGNATURE`](crate::catalog::type_codes::PACKAGE_SIGNATURE).
//!   It covers the header flags, file count, comment, and every other
//!   entry record byte for byte.
//!
//! Both messages are SHA-256 over a domain string followed by
//! length-prefixed fields:
//!
//! ```text
//! message = SHA-256(len || domain || len || field_1 || ... || len || field_n)
//! ```

use crate::catalog::{type_codes, Entry, EntryTable};
use crate::codec::ByteReader;
use crate::error::{NovusPackError, Result, SecurityErrorKind};
use crate::header::PackageHeader;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

/// Encoded size of a [`SignatureBlock`]
pub const SIGNATURE_BLOCK_SIZE: usize = 1 + PUBLIC_KEY_SIZE + SIGNATURE_SIZE;

/// Where [`Package::sign_package`](crate::Package::sign_package) stores the package signature
pub const PACKAGE_SIGNATURE_PATH: &str = "/.novuspack/signature";

pub const ENTRY_DOMAIN: &str = "novuspack/entry/v1";
pub const PACKAGE_DOMAIN: &str = "novuspack/package/v1";

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    Ed25519 = 1,
}

impl SignatureAlgorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Ed25519),
            _ => None,
        }
    }
}

/// Ed25519 signature with the signer's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub algorithm: SignatureAlgorithm,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    /// Always [`SIGNATURE_SIZE`] bytes
    pub signature: Vec<u8>,
}

/// Builder for a domain-separated signing digest
pub struct SigningMessage {
    hasher: Sha256,
}

impl SigningMessage {
    pub fn new(domain: &str) -> Self {
        let mut message = SigningMessage {
            hasher: Sha256::new(),
        };
        message.field(domain.as_bytes());
        message
    }

    /// Append one length-prefixed field
    pub fn field(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn finish(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

/// Whether `entry` holds the package signature
pub fn is_package_signature(entry: &Entry) -> bool {
    matches!(entry, Entry::File(f) if f.type_code == type_codes::PACKAGE_SIGNATURE)
}

/// Digest that the package signature covers
///
/// `header` must be the header as written, with the signature entry
/// already in `table`; that entry itself is skipped.
pub fn package_signing_message(
    header: &PackageHeader,
    table: &EntryTable,
    comment: Option<&str>,
) -> Result<[u8; 32]> {
    let mut message = SigningMessage::new(PACKAGE_DOMAIN);
    message
        .field(&header.flags.to_le_bytes())
        .field(&header.file_count.to_le_bytes())
        .field(comment.unwrap_or_default().as_bytes());

    let mut record = Vec::new();
    for entry in table.iter().filter(|e| !is_package_signature(e)) {
        record.clear();
        entry.encode(&mut record)?;
        message.field(&record);
    }
    Ok(message.finish())
}

impl SignatureBlock {
    pub fn sign(message: &[u8; 32], key: &SigningKey) -> Self {
        let signature = key.sign(message);
        SignatureBlock {
            algorithm: SignatureAlgorithm::Ed25519,
            public_key: key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
        }
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.public_key).map_err(|_| {
            NovusPackError::security(
                SecurityErrorKind::SignatureMismatch,
                "invalid ed25519 public key",
            )
        })
    }

    /// Verify against `message`, failing with [`SecurityErrorKind::SignatureMismatch`]
    pub fn verify(&self, message: &[u8; 32]) -> Result<()> {
        let key = self.verifying_key()?;
        let signature = Signature::from_slice(&self.signature).map_err(|_| {
            NovusPackError::security(
                SecurityErrorKind::SignatureMismatch,
                "malformed ed25519 signature",
            )
        })?;
        key.verify_strict(message, &signature).map_err(|_| {
            NovusPackError::security(
                SecurityErrorKind::SignatureMismatch,
                "signature does not verify",
            )
        })
    }

    /// All-zero block that reserves space until the real signature is known
    pub(crate) fn placeholder() -> Self {
        SignatureBlock {
            algorithm: SignatureAlgorithm::Ed25519,
            public_key: [0; PUBLIC_KEY_SIZE],
            signature: vec![0; SIGNATURE_SIZE],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_BLOCK_SIZE);
        self.encode(&mut out);
        out
    }

    /// Decode a block that must span all of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_BLOCK_SIZE {
            return Err(NovusPackError::Encoding(format!(
                "signature block is {} bytes (expected {})",
                bytes.len(),
                SIGNATURE_BLOCK_SIZE
            )));
        }
        Self::decode(&mut ByteReader::new(bytes, 0))
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.algorithm as u8);
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.signature);
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.offset();
        let code = reader.u8()?;
        let algorithm = SignatureAlgorithm::from_u8(code).ok_or_else(|| {
            NovusPackError::Encoding(format!(
                "unknown signature algorithm 0x{:02X} at offset {}",
                code, offset
            ))
        })?;
        let public_key = reader.array::<PUBLIC_KEY_SIZE>()?;
        let signature = reader.take(SIGNATURE_SIZE)?.to_vec();

        Ok(SignatureBlock {
            algorithm,
            public_key,
            signature,
        })
    }
}
