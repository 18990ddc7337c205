//! Custom metadata key rules

use crate::error::{NovusPackError, Result};
use crate::tag::TagValue;

/// Default ceiling for custom metadata keys in bytes
pub const DEFAULT_MAX_CUSTOM_KEY_LENGTH: usize = 128;

/// Custom keys are `[A-Za-z0-9_]+` and at most `max_len` bytes
pub fn validate_custom_key(key: &str, max_len: usize) -> Result<()> {
    if key.is_empty() {
        return Err(NovusPackError::validation(
            "key",
            "custom metadata key cannot be empty",
        ));
    }
    if key.len() > max_len {
        return Err(NovusPackError::Length {
            field: "custom metadata key",
            actual: key.len(),
            max: max_len,
        });
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(NovusPackError::validation(
            "key",
            format!(
                "custom metadata key '{}' contains invalid character {:?} (allowed: A-Z a-z 0-9 _)",
                key, c
            ),
        ));
    }
    Ok(())
}

/// Key and value checks, run independently
pub fn validate_custom_entry(key: &str, value: &TagValue, max_key_len: usize, max_value_len: usize) -> Result<()> {
    validate_custom_key(key, max_key_len)?;
    value.validate(max_value_len)
}
