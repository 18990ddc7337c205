//! Content checksums
//!
//! A checksum is stored with an algorithm byte so packages can mix
//! algorithms. Digests are computed over the stored bytes, which for an
//! encrypted entry means the ciphertext.

use crate::codec::ByteReader;
use crate::error::{NovusPackError, Result, SecurityErrorKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256 = 1,
    Crc32 = 2,
    Xxh3 = 3,
}

impl ChecksumAlgorithm {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Sha256),
            2 => Some(Self::Crc32),
            3 => Some(Self::Xxh3),
            _ => None,
        }
    }

    /// Digest length in bytes
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Crc32 => 4,
            Self::Xxh3 => 8,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Crc32 => crc32fast::hash(data).to_le_bytes().to_vec(),
            Self::Xxh3 => xxhash_rust::xxh3::xxh3_64(data).to_le_bytes().to_vec(),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha256 => "sha256",
            Self::Crc32 => "crc32",
            Self::Xxh3 => "xxh3",
        })
    }
}

/// Algorithm-tagged digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest: Vec<u8>,
}

impl Checksum {
    pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> Self {
        Checksum {
            algorithm,
            digest: algorithm.digest(data),
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        self.algorithm.digest(data) == self.digest
    }

    /// Check `data` against this checksum
    ///
    /// Fails with [`SecurityErrorKind::ChecksumMismatch`] naming both digests.
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let computed = Checksum::compute(self.algorithm, data);
        if computed.digest == self.digest {
            return Ok(());
        }
        Err(NovusPackError::security(
            SecurityErrorKind::ChecksumMismatch,
            format!(
                "{}: stored {}, computed {}",
                self.algorithm,
                self.to_hex(),
                computed.to_hex()
            ),
        ))
    }

    /// Lowercase hex rendering of the digest
    pub fn to_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.algorithm as u8);
        // digest_len() is at most 32
        out.push(self.digest.len() as u8);
        out.extend_from_slice(&self.digest);
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.offset();
        let code = reader.u8()?;
        let algorithm = ChecksumAlgorithm::from_u8(code).ok_or_else(|| {
            NovusPackError::Encoding(format!(
                "unknown checksum algorithm 0x{:02X} at offset {}",
                code, offset
            ))
        })?;

        let len = reader.u8()? as usize;
        if len != algorithm.digest_len() {
            return Err(NovusPackError::Encoding(format!(
                "{} digest length {} at offset {} (expected {})",
                algorithm,
                len,
                offset,
                algorithm.digest_len()
            )));
        }

        Ok(Checksum {
            algorithm,
            digest: reader.take(len)?.to_vec(),
        })
    }
}
