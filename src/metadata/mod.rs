//! Metadata store: tags, custom metadata, directory associations
//!
//! These operations act on an [`EntryTable`] directly and expect
//! normalized paths; [`Package`](crate::package::Package) wraps them with
//! locking, normalization, and access-mode checks.

pub mod custom;
pub mod special;

use crate::catalog::{type_codes, Entry, EntryTable, FileEntry};
use crate::config::PackageConfig;
use crate::error::{NovusPackError, Result};
use crate::header::PackageHeader;
use crate::path::ancestors;
use crate::security::is_package_signature;
use crate::tag::{validate_tag_key, TagMap, TagValue};
use serde::{Deserialize, Serialize};

/// Replacement metadata for a directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    pub tags: TagMap,
    pub inheritance_enabled: bool,
    pub permissions: u32,
    /// Unix epoch seconds, `None` keeps the current value
    pub created_at: Option<u64>,
    /// Unix epoch seconds, `None` stamps the current time
    pub modified_at: Option<u64>,
}

impl Default for DirectoryMetadata {
    fn default() -> Self {
        DirectoryMetadata {
            tags: TagMap::new(),
            inheritance_enabled: true,
            permissions: 0o755,
            created_at: None,
            modified_at: None,
        }
    }
}

impl DirectoryMetadata {
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn inheritance(mut self, enabled: bool) -> Self {
        self.inheritance_enabled = enabled;
        self
    }
}

fn check_tag(key: &str, value: &TagValue, config: &PackageConfig) -> Result<()> {
    validate_tag_key(key)?;
    value.validate(config.max_tag_value_length)
}

fn entry<'a>(table: &'a EntryTable, path: &str) -> Result<&'a Entry> {
    table.get(path).ok_or_else(|| NovusPackError::not_found(path))
}

fn file_mut<'a>(table: &'a mut EntryTable, path: &str) -> Result<&'a mut FileEntry> {
    match table.get_mut(path) {
        Some(Entry::File(f)) => Ok(f),
        Some(Entry::Directory(_)) => Err(NovusPackError::validation(
            "path",
            format!("'{}' is a directory, not a file", path),
        )),
        None => Err(NovusPackError::not_found(path)),
    }
}

/// Set a tag on a file or directory
pub fn set_tag(
    table: &mut EntryTable,
    path: &str,
    key: &str,
    value: TagValue,
    config: &PackageConfig,
) -> Result<()> {
    check_tag(key, &value, config)?;
    match table.get_mut(path) {
        Some(Entry::File(f)) => {
            f.tags.insert(key.to_string(), value);
            f.bump_version();
        }
        Some(Entry::Directory(d)) => {
            d.tags.insert(key.to_string(), value);
            d.touch();
        }
        None => return Err(NovusPackError::not_found(path)),
    }
    Ok(())
}

/// Remove a tag, returning the previous value
pub fn remove_tag(table: &mut EntryTable, path: &str, key: &str) -> Result<Option<TagValue>> {
    let removed = match table.get_mut(path) {
        Some(Entry::File(f)) => {
            let removed = f.tags.remove(key);
            if removed.is_some() {
                f.bump_version();
            }
            removed
        }
        Some(Entry::Directory(d)) => {
            let removed = d.tags.remove(key);
            if removed.is_some() {
                d.touch();
            }
            removed
        }
        None => return Err(NovusPackError::not_found(path)),
    };
    Ok(removed)
}

/// An entry's own tags (no inheritance)
pub fn get_tags<'a>(table: &'a EntryTable, path: &str) -> Result<&'a TagMap> {
    Ok(entry(table, path)?.tags())
}

pub fn set_custom(
    table: &mut EntryTable,
    path: &str,
    key: &str,
    value: TagValue,
    config: &PackageConfig,
) -> Result<()> {
    custom::validate_custom_entry(
        key,
        &value,
        config.max_custom_key_length,
        config.max_tag_value_length,
    )?;
    let file = file_mut(table, path)?;
    file.custom.insert(key.to_string(), value);
    file.bump_version();
    Ok(())
}

pub fn get_custom<'a>(table: &'a EntryTable, path: &str, key: &str) -> Result<Option<&'a TagValue>> {
    match entry(table, path)? {
        Entry::File(f) => Ok(f.custom.get(key)),
        Entry::Directory(_) => Err(NovusPackError::validation(
            "path",
            format!("'{}' is a directory, not a file", path),
        )),
    }
}

pub fn remove_custom(table: &mut EntryTable, path: &str, key: &str) -> Result<Option<TagValue>> {
    let file = file_mut(table, path)?;
    let removed = file.custom.remove(key);
    if removed.is_some() {
        file.bump_version();
    }
    Ok(removed)
}

/// Replace a directory's tags, inheritance flag, and filesystem properties
///
/// All tags are validated before anything changes.
pub fn set_directory_metadata(
    table: &mut EntryTable,
    path: &str,
    metadata: DirectoryMetadata,
    config: &PackageConfig,
) -> Result<()> {
    for (key, value) in &metadata.tags {
        check_tag(key, value, config)?;
    }

    let dir = match table.get_mut(path) {
        Some(Entry::Directory(d)) => d,
        Some(Entry::File(_)) => {
            return Err(NovusPackError::validation(
                "path",
                format!("'{}' is a file, not a directory", path),
            ))
        }
        None => return Err(NovusPackError::not_found(path)),
    };

    dir.tags = metadata.tags;
    dir.inheritance_enabled = metadata.inheritance_enabled;
    dir.permissions = metadata.permissions;
    if let Some(created) = metadata.created_at {
        dir.created_at = created;
    }
    match metadata.modified_at {
        Some(modified) => dir.modified_at = modified,
        None => dir.touch(),
    }
    Ok(())
}

/// Record that `file` belongs to `dir`
pub fn associate_file_with_directory(table: &mut EntryTable, file: &str, dir: &str) -> Result<()> {
    match table.get(dir) {
        Some(Entry::Directory(_)) => {}
        Some(Entry::File(_)) => {
            return Err(NovusPackError::validation(
                "directory",
                format!("'{}' is a file, not a directory", dir),
            ))
        }
        None => return Err(NovusPackError::not_found(dir)),
    }
    let entry = file_mut(table, file)?;
    entry.directory = Some(dir.to_string());
    entry.bump_version();
    Ok(())
}

/// Drop an explicit association; the file falls back to its lexical parent
pub fn disassociate_file(table: &mut EntryTable, file: &str) -> Result<()> {
    let entry = file_mut(table, file)?;
    if entry.directory.take().is_some() {
        entry.bump_version();
    }
    Ok(())
}

/// Directory a file belongs to
///
/// An explicit association wins; otherwise the nearest ancestor path that
/// has a directory entry.
pub fn owning_directory<'a>(table: &EntryTable, file: &'a FileEntry) -> Option<&'a str> {
    if let Some(dir) = file.directory.as_deref() {
        return Some(dir);
    }
    ancestors(&file.path).find(|p| table.directory(p).is_some())
}

/// Files belonging to `dir`, in table order
pub fn directory_files<'a>(table: &'a EntryTable, dir: &str) -> Result<Vec<&'a FileEntry>> {
    if table.directory(dir).is_none() {
        return Err(NovusPackError::not_found(dir));
    }
    Ok(table
        .files()
        .filter(|f| owning_directory(table, f) == Some(dir))
        .collect())
}

/// Clear explicit associations pointing at `dir`, returning how many changed
pub(crate) fn clear_associations_to(table: &mut EntryTable, dir: &str) -> usize {
    let mut cleared = 0;
    for entry in table.iter_mut() {
        if let Entry::File(f) = entry {
            if f.directory.as_deref() == Some(dir) {
                f.directory = None;
                f.bump_version();
                cleared += 1;
            }
        }
    }
    cleared
}

/// Metadata-only classification
///
/// True iff the header's file count is zero, the table holds something
/// besides a package signature, and every entry carries a reserved type
/// code.
pub fn is_metadata_only(header: &PackageHeader, table: &EntryTable) -> bool {
    header.file_count == 0
        && table.iter().any(|e| !is_package_signature(e))
        && table.iter().all(|e| type_codes::is_reserved(e.type_code()))
}
