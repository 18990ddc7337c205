//! Package path normalization
//!
//! Every entry in a package is keyed by a normalized path so lookups and
//! collision checks are independent of how a caller spelled the path.
//!
//! # Rules
//! - Backslashes are treated as separators
//! - Redundant separators collapse (`a//b` → `/a/b`)
//! - `.` segments are dropped, `..` pops the previous segment
//! - The result always carries a single leading `/`
//! - A path that escapes the package root or resolves to the root itself is rejected
//!
//! # Examples
//!
//! ```
//! use novuspack::path::normalize_path;
//!
//! assert_eq!(normalize_path("textures//wall.png").unwrap(), "/textures/wall.png");
//! assert_eq!(normalize_path("/a/./b/../c").unwrap(), "/a/c");
//! assert!(normalize_path("../etc/passwd").is_err());
//! ```

use crate::error::{NovusPackError, Result};

/// Maximum normalized path length in bytes
pub const MAX_PATH_LENGTH: usize = 4096;

/// Normalize a package path
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(NovusPackError::validation("path", "path cannot be empty"));
    }

    if path.trim().is_empty() {
        return Err(NovusPackError::validation(
            "path",
            "path cannot be whitespace only",
        ));
    }

    if path.contains('\0') {
        return Err(NovusPackError::validation(
            "path",
            "path cannot contain NUL bytes",
        ));
    }

    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    return Err(NovusPackError::validation(
                        "path",
                        format!("path '{}' escapes the package root", path),
                    ));
                }
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(NovusPackError::validation(
            "path",
            format!("path '{}' resolves to the package root", path),
        ));
    }

    let normalized = format!("/{}", segments.join("/"));

    if normalized.len() > MAX_PATH_LENGTH {
        return Err(NovusPackError::Length {
            field: "path",
            actual: normalized.len(),
            max: MAX_PATH_LENGTH,
        });
    }

    Ok(normalized)
}

/// Lexical parent of a normalized path, `None` for top-level entries
///
/// ```
/// use novuspack::path::parent_path;
///
/// assert_eq!(parent_path("/a/b/c.txt"), Some("/a/b"));
/// assert_eq!(parent_path("/top.txt"), None);
/// ```
pub fn parent_path(normalized: &str) -> Option<&str> {
    match normalized.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&normalized[..idx]),
    }
}

/// Final segment of a normalized path
pub fn file_name(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or(normalized)
}

/// Ancestors of a normalized path, nearest first
///
/// `/a/b/c` yields `/a/b`, then `/a`.
pub fn ancestors(normalized: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(parent_path(normalized), |p| parent_path(*p))
}
