//! Package comment validation and sanitization
//!
//! Comments are untrusted text that ends up in tooling output, so they are
//! checked once at write time:
//! 1. The bytes must be valid UTF-8 ([`NovusPackError::Encoding`])
//! 2. The byte length must not exceed the configured ceiling ([`NovusPackError::Length`])
//! 3. No control characters or script-like markers ([`SecurityErrorKind::InjectionPattern`])
//!
//! Accepted comments have their line endings normalized to `\n`. The same
//! input always produces the same output and digest.

use crate::error::{NovusPackError, Result, SecurityErrorKind};
use regex::RegexSet;
use sha2::{Digest, Sha256};

/// Default comment ceiling in bytes
pub const DEFAULT_MAX_COMMENT_LENGTH: usize = 65_535;

/// Script-like markers rejected in comments (case-insensitive)
const INJECTION_PATTERNS: &[&str] = &[
    r"(?i)<\s*/?\s*script",
    r"(?i)<\s*iframe",
    r"(?i)<\s*object",
    r"(?i)<\s*embed",
    r"(?i)javascript\s*:",
    r"(?i)vbscript\s*:",
    r"(?i)data\s*:\s*text/html",
    r"(?i)\bon(load|error|click|focus|blur|change|submit|mouse[a-z]*|key[a-z]*)\s*=",
];

/// A comment that passed validation, with its content digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedComment {
    text: String,
    digest: [u8; 32],
}

impl SanitizedComment {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// SHA-256 over the sanitized text
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// SHA-256 over stored comment text
pub fn comment_digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

/// Validate raw comment bytes and sanitize them
pub fn sanitize_comment_bytes(bytes: &[u8], max_len: usize) -> Result<SanitizedComment> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        NovusPackError::Encoding(format!(
            "comment is not valid UTF-8 (error at byte {})",
            e.valid_up_to()
        ))
    })?;
    sanitize_comment(text, max_len)
}

/// Validate a comment string and sanitize it
pub fn sanitize_comment(text: &str, max_len: usize) -> Result<SanitizedComment> {
    if text.len() > max_len {
        return Err(NovusPackError::Length {
            field: "comment",
            actual: text.len(),
            max: max_len,
        });
    }

    if let Some((pos, ch)) = text
        .char_indices()
        .find(|(_, c)| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(NovusPackError::security(
            SecurityErrorKind::InjectionPattern,
            format!("control character U+{:04X} at byte {}", ch as u32, pos),
        ));
    }

    let set = RegexSet::new(INJECTION_PATTERNS)?;
    if let Some(idx) = set.matches(text).iter().next() {
        return Err(NovusPackError::security(
            SecurityErrorKind::InjectionPattern,
            format!("script-like marker matched pattern {}", INJECTION_PATTERNS[idx]),
        ));
    }

    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let digest = comment_digest(&normalized);

    Ok(SanitizedComment {
        text: normalized,
        digest,
    })
}
