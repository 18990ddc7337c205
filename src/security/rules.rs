//! Rule-based encryption input validation
//!
//! [`EncryptionValidator`] holds an ordered list of [`EncryptionRule`]s.
//! Each call evaluates the rules that apply to its subject in order and
//! stops at the first failure, returning that rule's message.

use crate::error::{NovusPackError, Result, SecurityErrorKind};
use crate::security::encryption::{EncryptionType, ENCRYPTION_OVERHEAD, KEY_SIZE};
use std::fmt;
use tracing::debug;

/// Default ceiling for a single plaintext payload (1 GiB)
pub const DEFAULT_MAX_DATA_SIZE: usize = 1 << 30;

/// Input under validation
#[derive(Debug, Clone, Copy)]
pub enum RuleSubject<'a> {
    /// Plaintext about to be encrypted
    EncryptionData {
        data: &'a [u8],
        encryption_type: EncryptionType,
    },
    /// Stored bytes about to be decrypted
    DecryptionData {
        data: &'a [u8],
        encryption_type: EncryptionType,
    },
    /// Key material
    Key {
        key: &'a [u8],
        encryption_type: EncryptionType,
    },
}

impl RuleSubject<'_> {
    pub fn encryption_type(&self) -> EncryptionType {
        match self {
            RuleSubject::EncryptionData { encryption_type, .. }
            | RuleSubject::DecryptionData { encryption_type, .. }
            | RuleSubject::Key { encryption_type, .. } => *encryption_type,
        }
    }

    /// Payload bytes, `None` for key subjects
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            RuleSubject::EncryptionData { data, .. } | RuleSubject::DecryptionData { data, .. } => {
                Some(*data)
            }
            RuleSubject::Key { .. } => None,
        }
    }

    fn error_kind(&self) -> SecurityErrorKind {
        match self {
            RuleSubject::Key { .. } => SecurityErrorKind::InvalidEncryptionKey,
            _ => SecurityErrorKind::InvalidEncryptionData,
        }
    }
}

/// A single validation rule
pub trait EncryptionRule: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this rule has anything to say about `subject`
    fn applies(&self, subject: &RuleSubject<'_>) -> bool;

    /// `Err(message)` when the subject violates the rule
    fn check(&self, subject: &RuleSubject<'_>) -> std::result::Result<(), String>;
}

type ApplyFn = dyn Fn(&RuleSubject<'_>) -> bool + Send + Sync;
type CheckFn = dyn Fn(&RuleSubject<'_>) -> std::result::Result<(), String> + Send + Sync;

/// Rule built from closures
pub struct FnRule {
    name: String,
    applies: Box<ApplyFn>,
    check: Box<CheckFn>,
}

impl FnRule {
    pub fn new<A, C>(name: impl Into<String>, applies: A, check: C) -> Self
    where
        A: Fn(&RuleSubject<'_>) -> bool + Send + Sync + 'static,
        C: Fn(&RuleSubject<'_>) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        FnRule {
            name: name.into(),
            applies: Box::new(applies),
            check: Box::new(check),
        }
    }
}

impl EncryptionRule for FnRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies(&self, subject: &RuleSubject<'_>) -> bool {
        (self.applies)(subject)
    }

    fn check(&self, subject: &RuleSubject<'_>) -> std::result::Result<(), String> {
        (self.check)(subject)
    }
}

impl EncryptionRule for Box<dyn EncryptionRule> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn applies(&self, subject: &RuleSubject<'_>) -> bool {
        (**self).applies(subject)
    }

    fn check(&self, subject: &RuleSubject<'_>) -> std::result::Result<(), String> {
        (**self).check(subject)
    }
}

/// Ordered, fail-fast rule list
pub struct EncryptionValidator {
    rules: Vec<Box<dyn EncryptionRule>>,
}

impl EncryptionValidator {
    /// Validator with no rules; every subject passes
    pub fn empty() -> Self {
        EncryptionValidator { rules: Vec::new() }
    }

    /// Validator with the built-in rules
    pub fn new(max_data_size: usize) -> Self {
        let mut validator = Self::empty();

        validator.add_rule(FnRule::new(
            "encrypted_type",
            |_| true,
            |s| match s.encryption_type() {
                EncryptionType::None => Err("encryption type is None".to_string()),
                _ => Ok(()),
            },
        ));

        validator.add_rule(FnRule::new(
            "non_empty_data",
            |s| s.data().is_some(),
            |s| match s.data() {
                Some(d) if d.is_empty() => Err("data cannot be empty".to_string()),
                _ => Ok(()),
            },
        ));

        validator.add_rule(FnRule::new(
            "max_data_size",
            |s| matches!(s, RuleSubject::EncryptionData { .. }),
            move |s| match s.data() {
                Some(d) if d.len() > max_data_size => Err(format!(
                    "data size {} exceeds maximum of {} bytes",
                    d.len(),
                    max_data_size
                )),
                _ => Ok(()),
            },
        ));

        validator.add_rule(FnRule::new(
            "ciphertext_overhead",
            |s| {
                matches!(
                    s,
                    RuleSubject::DecryptionData {
                        encryption_type: EncryptionType::Aes256Gcm,
                        ..
                    }
                )
            },
            |s| match s.data() {
                Some(d) if d.len() < ENCRYPTION_OVERHEAD => Err(format!(
                    "ciphertext of {} bytes is shorter than nonce and tag ({} bytes)",
                    d.len(),
                    ENCRYPTION_OVERHEAD
                )),
                _ => Ok(()),
            },
        ));

        validator.add_rule(FnRule::new(
            "key_length",
            |s| {
                matches!(
                    s,
                    RuleSubject::Key {
                        encryption_type: EncryptionType::Aes256Gcm,
                        ..
                    }
                )
            },
            |s| match s {
                RuleSubject::Key { key, .. } if key.len() != KEY_SIZE => Err(format!(
                    "key must be {} bytes, got {}",
                    KEY_SIZE,
                    key.len()
                )),
                _ => Ok(()),
            },
        ));

        validator.add_rule(FnRule::new(
            "key_not_zero",
            |s| matches!(s, RuleSubject::Key { .. }),
            |s| match s {
                RuleSubject::Key { key, .. } if key.iter().all(|b| *b == 0) => {
                    Err("key cannot be all zeros".to_string())
                }
                _ => Ok(()),
            },
        ));

        validator
    }

    /// Append a rule; it runs after the existing ones
    pub fn add_rule<R: EncryptionRule + 'static>(&mut self, rule: R) {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn validate_encryption_data(&self, data: &[u8], encryption_type: EncryptionType) -> Result<()> {
        self.run(&RuleSubject::EncryptionData {
            data,
            encryption_type,
        })
    }

    pub fn validate_decryption_data(&self, data: &[u8], encryption_type: EncryptionType) -> Result<()> {
        self.run(&RuleSubject::DecryptionData {
            data,
            encryption_type,
        })
    }

    pub fn validate_encryption_key(&self, key: &[u8], encryption_type: EncryptionType) -> Result<()> {
        self.run(&RuleSubject::Key {
            key,
            encryption_type,
        })
    }

    fn run(&self, subject: &RuleSubject<'_>) -> Result<()> {
        for rule in self.rules.iter().filter(|r| r.applies(subject)) {
            if let Err(message) = rule.check(subject) {
                debug!("Encryption rule '{}' failed: {}", rule.name(), message);
                return Err(NovusPackError::security(subject.error_kind(), message));
            }
        }
        Ok(())
    }
}

impl Default for EncryptionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DATA_SIZE)
    }
}

impl fmt::Debug for EncryptionValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionValidator")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_accept_valid_input() {
        let v = EncryptionValidator::default();
        assert!(v
            .validate_encryption_data(b"payload", EncryptionType::Aes256Gcm)
            .is_ok());
        assert!(v
            .validate_decryption_data(&[1u8; 40], EncryptionType::Aes256Gcm)
            .is_ok());
        assert!(v
            .validate_encryption_key(&[7u8; 32], EncryptionType::Aes256Gcm)
            .is_ok());
    }

    #[test]
    fn test_empty_data_rejected() {
        let err = EncryptionValidator::default()
            .validate_encryption_data(b"", EncryptionType::Aes256Gcm)
            .unwrap_err();
        assert_eq!(
            err.security_kind(),
            Some(SecurityErrorKind::InvalidEncryptionData)
        );
        assert!(err.to_string().contains("data cannot be empty"));
    }

    #[test]
    fn test_key_rules() {
        let v = EncryptionValidator::default();
        let err = v
            .validate_encryption_key(&[7u8; 16], EncryptionType::Aes256Gcm)
            .unwrap_err();
        assert_eq!(err.security_kind(), Some(SecurityErrorKind::InvalidEncryptionKey));
        assert!(err.to_string().contains("key must be 32 bytes"));

        assert!(v
            .validate_encryption_key(&[0u8; 32], EncryptionType::Aes256Gcm)
            .is_err());
    }

    #[test]
    fn test_size_ceiling() {
        let v = EncryptionValidator::new(4);
        assert!(v
            .validate_encryption_data(b"12345", EncryptionType::Aes256Gcm)
            .is_err());
        // ceiling only applies to plaintext
        assert!(v
            .validate_decryption_data(&[1u8; 64], EncryptionType::Aes256Gcm)
            .is_ok());
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let err = EncryptionValidator::default()
            .validate_decryption_data(&[1u8; 20], EncryptionType::Aes256Gcm)
            .unwrap_err();
        assert!(err.to_string().contains("shorter than nonce and tag"));
    }

    #[test]
    fn test_first_failure_wins() {
        // None type and empty data both fail; the type rule runs first
        let err = EncryptionValidator::default()
            .validate_encryption_data(b"", EncryptionType::None)
            .unwrap_err();
        assert!(err.to_string().contains("encryption type is None"));
    }

    #[test]
    fn test_custom_rule_runs_in_order() {
        let mut v = EncryptionValidator::empty();
        v.add_rule(FnRule::new(
            "no_magic",
            |s| s.data().is_some(),
            |s| match s.data() {
                Some(d) if d.starts_with(b"MZ") => Err("executables not allowed".to_string()),
                _ => Ok(()),
            },
        ));
        v.add_rule(FnRule::new("always_fails", |_| true, |_| Err("second".to_string())));

        assert_eq!(v.rule_names(), vec!["no_magic", "always_fails"]);
        let err = v
            .validate_encryption_data(b"MZ\x90", EncryptionType::Aes256Gcm)
            .unwrap_err();
        assert!(err.to_string().contains("executables not allowed"));

        let err = v
            .validate_encryption_key(&[1u8; 32], EncryptionType::Aes256Gcm)
            .unwrap_err();
        assert!(err.to_string().contains("second"));
    }

    #[test]
    fn test_empty_validator_accepts_everything() {
        let v = EncryptionValidator::empty();
        assert!(v.validate_encryption_data(b"", EncryptionType::None).is_ok());
    }
}
