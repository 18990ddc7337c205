//! Package limits and defaults
//!
//! Loadable from TOML; every field has a default so a partial file works:
//!
//! ```
//! use novuspack::config::PackageConfig;
//!
//! let config = PackageConfig::from_toml_str("max_comment_length = 1024").unwrap();
//! assert_eq!(config.max_comment_length, 1024);
//! assert_eq!(config.max_entries, PackageConfig::default().max_entries);
//! ```

use crate::comment::DEFAULT_MAX_COMMENT_LENGTH;
use crate::error::Result;
use crate::metadata::custom::DEFAULT_MAX_CUSTOM_KEY_LENGTH;
use crate::security::rules::DEFAULT_MAX_DATA_SIZE;
use crate::security::ChecksumAlgorithm;
use crate::tag::DEFAULT_MAX_TAG_VALUE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PackageConfig {
    /// Comment ceiling in bytes
    #[validate(range(min = 1))]
    pub max_comment_length: usize,

    /// Ceiling for string and YAML tag values in bytes
    #[validate(range(min = 1))]
    pub max_tag_value_length: usize,

    /// Ceiling for custom metadata keys in bytes
    #[validate(range(min = 1, max = 255))]
    pub max_custom_key_length: usize,

    /// Maximum number of entries in the table
    #[validate(range(min = 1))]
    pub max_entries: usize,

    /// Largest plaintext accepted for encryption
    #[validate(range(min = 1))]
    pub max_encrypted_data_size: usize,

    /// Checksum algorithm for new entries
    pub checksum_algorithm: ChecksumAlgorithm,
}

impl Default for PackageConfig {
    fn default() -> Self {
        PackageConfig {
            max_comment_length: DEFAULT_MAX_COMMENT_LENGTH,
            max_tag_value_length: DEFAULT_MAX_TAG_VALUE_LENGTH,
            max_custom_key_length: DEFAULT_MAX_CUSTOM_KEY_LENGTH,
            max_entries: 1_000_000,
            max_encrypted_data_size: DEFAULT_MAX_DATA_SIZE,
            checksum_algorithm: ChecksumAlgorithm::default(),
        }
    }
}

impl PackageConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PackageConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate field ranges
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NovusPackError;

    #[test]
    fn test_defaults() {
        let config = PackageConfig::default();
        assert_eq!(config.max_comment_length, 65_535);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Sha256);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = PackageConfig::from_toml_str(
            r#"
            max_comment_length = 256
            max_custom_key_length = 32
            checksum_algorithm = "xxh3"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_comment_length, 256);
        assert_eq!(config.max_custom_key_length, 32);
        assert_eq!(config.checksum_algorithm, ChecksumAlgorithm::Xxh3);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = PackageConfig::from_toml_str("max_custom_key_length = 0").unwrap_err();
        assert!(matches!(err, NovusPackError::Config(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            PackageConfig::from_toml_str("max_entries = \"many\""),
            Err(NovusPackError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("novuspack.toml");
        std::fs::write(&path, "max_entries = 10\n").unwrap();
        let config = PackageConfig::from_file(&path).unwrap();
        assert_eq!(config.max_entries, 10);
    }
}
