//! Payload encryption
//!
//! Encrypted entries store `[nonce: 12 bytes][ciphertext][tag: 16 bytes]`
//! produced by AES-256-GCM. The quantum-safe type code is recognized on
//! the wire but this crate has no implementation for it.

use crate::error::{NovusPackError, Result, SecurityErrorKind};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encryption key (32 bytes for AES-256)
pub type EncryptionKey = [u8; 32];

pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (96 bits / 12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;

/// Overhead added by encryption (nonce + tag)
pub const ENCRYPTION_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncryptionType {
    #[default]
    None = 0x00,
    Aes256Gcm = 0x01,
    /// ML-KEM + ML-DSA; recognized but not implemented
    QuantumSafe = 0x02,
}

impl EncryptionType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::None),
            0x01 => Some(Self::Aes256Gcm),
            0x02 => Some(Self::QuantumSafe),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Aes256Gcm => "AES-256-GCM",
            Self::QuantumSafe => "Quantum-Safe (ML-KEM + ML-DSA)",
        }
    }

    pub fn is_encrypted(self) -> bool {
        self != Self::None
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `value` is a known encryption type code
pub fn is_valid_encryption_type(value: u8) -> bool {
    EncryptionType::from_u8(value).is_some()
}

/// Human-readable name for an encryption type code
pub fn encryption_type_name(value: u8) -> Result<&'static str> {
    EncryptionType::from_u8(value)
        .map(EncryptionType::name)
        .ok_or_else(|| NovusPackError::validation("encryption_type", "invalid encryption type"))
}

/// Generate a random encryption key
pub fn generate_key() -> EncryptionKey {
    let mut key = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encrypt data using AES-256-GCM
///
/// Returns encrypted data with format: [nonce][ciphertext][tag]
pub fn encrypt(data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, data).map_err(|e| {
        NovusPackError::security(
            SecurityErrorKind::InvalidEncryptionData,
            format!("encryption failed: {}", e),
        )
    })?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt data using AES-256-GCM
///
/// Expects data in format: [nonce][ciphertext][tag]
pub fn decrypt(data: &[u8], key: &EncryptionKey) -> Result<Vec<u8>> {
    if data.len() < ENCRYPTION_OVERHEAD {
        return Err(NovusPackError::security(
            SecurityErrorKind::InvalidEncryptionData,
            format!(
                "encrypted data too short: {} < {}",
                data.len(),
                ENCRYPTION_OVERHEAD
            ),
        ));
    }

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);

    cipher.decrypt(nonce, &data[NONCE_SIZE..]).map_err(|_| {
        NovusPackError::security(
            SecurityErrorKind::DecryptionFailed,
            "authentication failed (wrong key or tampered data)",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let key1 = generate_key();
        let key2 = generate_key();
        assert_ne!(key1, key2);
    }

    #[test]
    fn test_encryption_decryption() {
        let key = generate_key();
        let plaintext = b"level one geometry";

        let ciphertext = encrypt(plaintext, &key).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len() + ENCRYPTION_OVERHEAD);
        assert_eq!(decrypt(&ciphertext, &key).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let ciphertext = encrypt(b"secret", &generate_key()).unwrap();
        let err = decrypt(&ciphertext, &generate_key()).unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_tampered_data_fails() {
        let key = generate_key();
        let mut ciphertext = encrypt(b"secret", &key).unwrap();
        ciphertext[NONCE_SIZE] ^= 0xFF;
        assert!(decrypt(&ciphertext, &key).is_err());
    }

    #[test]
    fn test_short_data_fails() {
        let err = decrypt(&[0u8; 10], &generate_key()).unwrap_err();
        assert_eq!(
            err.security_kind(),
            Some(SecurityErrorKind::InvalidEncryptionData)
        );
    }

    #[test]
    fn test_type_lookups() {
        assert!(is_valid_encryption_type(0x00));
        assert!(is_valid_encryption_type(0x01));
        assert!(is_valid_encryption_type(0x02));
        assert!(!is_valid_encryption_type(0x03));
        assert_eq!(encryption_type_name(0x01).unwrap(), "AES-256-GCM");

        let err = encryption_type_name(0xFF).unwrap_err();
        assert!(matches!(
            err,
            NovusPackError::Validation { ref reason, .. } if reason == "invalid encryption type"
        ));
    }
}
