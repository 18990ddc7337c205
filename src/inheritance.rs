//! Directory → file tag inheritance
//!
//! A file's effective tags merge the tags of its directory chain with its
//! own. The chain starts at the file's explicitly associated directory, or
//! else at its nearest ancestor that has a directory entry, and walks up by
//! path prefix. Nearer directories win over farther ones and the file's own
//! tags win over everything.
//!
//! A directory with inheritance disabled still passes its tags to its
//! direct members, but it blocks itself and everything above it from
//! reaching anything deeper.
//!
//! Nothing is cached: every call recomputes from the current table.

use crate::catalog::{DirectoryEntry, EntryTable, FileEntry};
use crate::metadata::owning_directory;
use crate::path::ancestors;
use crate::tag::{TagMap, TagValue};

/// Directories contributing to `file`, nearest first
pub fn inheritance_chain<'a>(table: &'a EntryTable, file: &FileEntry) -> Vec<&'a DirectoryEntry> {
    let mut chain = Vec::new();

    let Some(owner) = owning_directory(table, file).and_then(|p| table.directory(p)) else {
        return chain;
    };
    chain.push(owner);
    if !owner.inheritance_enabled {
        return chain;
    }

    for path in ancestors(&owner.path) {
        let Some(dir) = table.directory(path) else {
            continue;
        };
        if !dir.inheritance_enabled {
            break;
        }
        chain.push(dir);
    }

    chain
}

/// Merged tag view for `file`
pub fn effective_tags(table: &EntryTable, file: &FileEntry) -> TagMap {
    let mut merged = TagMap::new();
    for dir in inheritance_chain(table, file).into_iter().rev() {
        merged.extend(dir.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged.extend(file.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Effective value of a single key, without building the whole map
pub fn effective_tag<'a>(table: &'a EntryTable, file: &'a FileEntry, key: &str) -> Option<&'a TagValue> {
    if let Some(own) = file.tags.get(key) {
        return Some(own);
    }
    inheritance_chain(table, file)
        .into_iter()
        .find_map(|dir| dir.tags.get(key))
}
