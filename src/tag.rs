//! Typed tag values
//!
//! Tags and custom metadata share one closed value type. Each value is
//! encoded with an explicit type byte so decoding never has to guess:
//!
//! | Type | Code | Payload |
//! |---|---|---|
//! | String | 0x00 | u32 length + UTF-8 |
//! | Integer | 0x01 | i64 LE |
//! | Float | 0x02 | f64 LE |
//! | Boolean | 0x03 | u8 (0 or 1) |
//! | YAML | 0x05 | u32 length + UTF-8 |

use crate::codec::{put_long_str, put_short_str, put_u16, put_u64, ByteReader};
use crate::error::{NovusPackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum tag key length in bytes
pub const MAX_TAG_KEY_LENGTH: usize = 255;

/// Default ceiling for string and YAML values in bytes
pub const DEFAULT_MAX_TAG_VALUE_LENGTH: usize = 64 * 1024;

/// Tag key → value, ordered by key for deterministic encoding
pub type TagMap = BTreeMap<String, TagValue>;

/// Type identifier of a [`TagValue`]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagValueType {
    String = 0x00,
    Integer = 0x01,
    Float = 0x02,
    Boolean = 0x03,
    Yaml = 0x05,
}

impl TagValueType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::String),
            0x01 => Some(Self::Integer),
            0x02 => Some(Self::Float),
            0x03 => Some(Self::Boolean),
            0x05 => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// A typed tag value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TagValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// YAML document kept as text; must parse
    Yaml(String),
}

impl TagValue {
    pub fn value_type(&self) -> TagValueType {
        match self {
            TagValue::String(_) => TagValueType::String,
            TagValue::Integer(_) => TagValueType::Integer,
            TagValue::Float(_) => TagValueType::Float,
            TagValue::Boolean(_) => TagValueType::Boolean,
            TagValue::Yaml(_) => TagValueType::Yaml,
        }
    }

    /// Build a YAML value, checking that it parses
    pub fn yaml(text: impl Into<String>) -> Result<Self> {
        let value = TagValue::Yaml(text.into());
        value.validate(DEFAULT_MAX_TAG_VALUE_LENGTH)?;
        Ok(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TagValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TagValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Type-specific validity check
    ///
    /// - strings and YAML: at most `max_len` bytes, no NUL
    /// - YAML: must parse
    /// - floats: must be finite
    pub fn validate(&self, max_len: usize) -> Result<()> {
        match self {
            TagValue::String(s) | TagValue::Yaml(s) => {
                if s.len() > max_len {
                    return Err(NovusPackError::Length {
                        field: "tag value",
                        actual: s.len(),
                        max: max_len,
                    });
                }
                if s.contains('\0') {
                    return Err(NovusPackError::validation(
                        "value",
                        "tag value cannot contain NUL bytes",
                    ));
                }
                if let TagValue::Yaml(text) = self {
                    serde_yaml::from_str::<serde_yaml::Value>(text).map_err(|e| {
                        NovusPackError::validation("value", format!("invalid YAML: {}", e))
                    })?;
                }
                Ok(())
            }
            TagValue::Float(v) if !v.is_finite() => Err(NovusPackError::validation(
                "value",
                format!("float tag value must be finite, got {}", v),
            )),
            _ => Ok(()),
        }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        out.push(self.value_type() as u8);
        match self {
            TagValue::String(s) | TagValue::Yaml(s) => put_long_str(out, s)?,
            TagValue::Integer(v) => put_u64(out, *v as u64),
            TagValue::Float(v) => put_u64(out, v.to_bits()),
            TagValue::Boolean(v) => out.push(*v as u8),
        }
        Ok(())
    }

    pub(crate) fn decode(reader: &mut ByteReader<'_>) -> Result<Self> {
        let offset = reader.offset();
        let code = reader.u8()?;
        let value_type = TagValueType::from_u8(code).ok_or_else(|| {
            NovusPackError::Encoding(format!(
                "unknown tag value type 0x{:02X} at offset {}",
                code, offset
            ))
        })?;

        Ok(match value_type {
            TagValueType::String => TagValue::String(reader.long_str()?),
            TagValueType::Integer => TagValue::Integer(reader.i64()?),
            TagValueType::Float => TagValue::Float(f64::from_bits(reader.u64()?)),
            TagValueType::Boolean => TagValue::Boolean(reader.bool()?),
            TagValueType::Yaml => TagValue::Yaml(reader.long_str()?),
        })
    }
}

/// Type-aware equality
///
/// Values of different types are never equal. Floats compare numerically,
/// so `0.0 == -0.0` (stored floats are finite). YAML compares parsed
/// documents, falling back to the raw text when either side does not parse.
impl PartialEq for TagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TagValue::String(a), TagValue::String(b)) => a == b,
            (TagValue::Integer(a), TagValue::Integer(b)) => a == b,
            (TagValue::Boolean(a), TagValue::Boolean(b)) => a == b,
            (TagValue::Float(a), TagValue::Float(b)) => a == b,
            (TagValue::Yaml(a), TagValue::Yaml(b)) => {
                if a == b {
                    return true;
                }
                match (
                    serde_yaml::from_str::<serde_yaml::Value>(a),
                    serde_yaml::from_str::<serde_yaml::Value>(b),
                ) {
                    (Ok(x), Ok(y)) => x == y,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::String(s) => write!(f, "{}", s),
            TagValue::Integer(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::Boolean(v) => write!(f, "{}", v),
            TagValue::Yaml(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::String(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Integer(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Boolean(value)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

/// Validate a tag key
///
/// Keys are non-empty, at most [`MAX_TAG_KEY_LENGTH`] bytes, carry no
/// whitespace or control characters.
pub fn validate_tag_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(NovusPackError::validation("key", "tag key cannot be empty"));
    }
    if key.len() > MAX_TAG_KEY_LENGTH {
        return Err(NovusPackError::Length {
            field: "tag key",
            actual: key.len(),
            max: MAX_TAG_KEY_LENGTH,
        });
    }
    if let Some(c) = key.chars().find(|c| c.is_whitespace() || c.is_control()) {
        return Err(NovusPackError::validation(
            "key",
            format!("tag key '{}' contains invalid character {:?}", key, c),
        ));
    }
    Ok(())
}

pub(crate) fn encode_tag_map(map: &TagMap, out: &mut Vec<u8>) -> Result<()> {
    let count = u16::try_from(map.len()).map_err(|_| NovusPackError::Length {
        field: "tag map",
        actual: map.len(),
        max: u16::MAX as usize,
    })?;
    put_u16(out, count);
    for (key, value) in map {
        put_short_str(out, key)?;
        value.encode(out)?;
    }
    Ok(())
}

pub(crate) fn decode_tag_map(reader: &mut ByteReader<'_>) -> Result<TagMap> {
    let count = reader.u16()?;
    let mut map = TagMap::new();
    for _ in 0..count {
        let offset = reader.offset();
        let key = reader.short_str()?;
        let value = TagValue::decode(reader)?;
        if map.insert(key.clone(), value).is_some() {
            return Err(NovusPackError::Encoding(format!(
                "duplicate tag key '{}' at offset {}",
                key, offset
            )));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aware_equality() {
        assert_eq!(TagValue::from("1"), TagValue::from("1"));
        assert_ne!(TagValue::from("1"), TagValue::Integer(1));
        assert_ne!(TagValue::Integer(1), TagValue::Float(1.0));
        assert_ne!(TagValue::Boolean(true), TagValue::from("true"));
        assert_eq!(TagValue::Float(0.5), TagValue::Float(0.5));
    }

    #[test]
    fn test_yaml_equality_is_structural() {
        let a = TagValue::yaml("a: 1\nb: [x, y]").unwrap();
        let b = TagValue::yaml("{b: [x, y], a: 1}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, TagValue::yaml("a: 2").unwrap());
    }

    #[test]
    fn test_yaml_must_parse() {
        assert!(TagValue::yaml("key: [unclosed").is_err());
        assert!(TagValue::Yaml("- ok".into()).validate(100).is_ok());
    }

    #[test]
    fn test_signed_zero_floats_match() {
        assert_eq!(TagValue::Float(0.0), TagValue::Float(-0.0));
        assert_ne!(TagValue::Float(0.0), TagValue::Integer(0));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(TagValue::Float(f64::NAN).validate(10).is_err());
        assert!(TagValue::Float(f64::INFINITY).validate(10).is_err());
        assert!(TagValue::Float(-2.5).validate(10).is_ok());
    }

    #[test]
    fn test_string_length_ceiling() {
        let v = TagValue::String("x".repeat(20));
        assert!(matches!(v.validate(10), Err(NovusPackError::Length { .. })));
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_tag_key("category").is_ok());
        assert!(validate_tag_key("build.stage-1").is_ok());
        assert!(validate_tag_key("").is_err());
        assert!(validate_tag_key("has space").is_err());
        assert!(validate_tag_key(&"k".repeat(MAX_TAG_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_tag_map_encoding_keeps_types() {
        let mut map = TagMap::new();
        map.insert("name".into(), TagValue::from("wall"));
        map.insert("build_number".into(), TagValue::Integer(-42));
        map.insert("beta_version".into(), TagValue::Boolean(true));
        map.insert("scale".into(), TagValue::Float(1.25));
        map.insert("extra".into(), TagValue::Yaml("k: v".into()));

        let mut out = Vec::new();
        encode_tag_map(&map, &mut out).unwrap();
        let decoded = decode_tag_map(&mut ByteReader::new(&out, 0)).unwrap();

        assert_eq!(decoded, map);
        assert_eq!(decoded["build_number"].value_type(), TagValueType::Integer);
    }

    #[test]
    fn test_unknown_type_code_rejected() {
        let bytes = [1, 0, 1, 0, b'k', 0x04];
        assert!(matches!(
            decode_tag_map(&mut ByteReader::new(&bytes, 0)),
            Err(NovusPackError::Encoding(_))
        ));
    }
}
