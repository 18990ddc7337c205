//! Tag search over effective (inherited) tags

use crate::cancel::CancellationToken;
use crate::catalog::{EntryTable, FileEntry};
use crate::error::Result;
use crate::inheritance::effective_tag;
use crate::tag::{validate_tag_key, TagValue};
use tracing::debug;

/// Files whose effective tags contain `key` equal to `value`
///
/// The key and value are validated before any entry is visited. Results
/// follow table order. On cancellation the partial result is dropped.
pub fn get_files_by_tag<'a>(
    table: &'a EntryTable,
    key: &str,
    value: &TagValue,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<&'a FileEntry>> {
    validate_tag_key(key)?;
    value.validate(usize::MAX)?;

    let mut matches = Vec::new();
    for file in table.files() {
        if let Some(token) = cancel {
            token.check()?;
        }
        if effective_tag(table, file, key) == Some(value) {
            matches.push(file);
        }
    }

    debug!("Tag query {}={} matched {} files", key, value, matches.len());
    Ok(matches)
}

/// Files whose effective tags contain `key`, whatever the value
pub fn get_files_with_tag_key<'a>(
    table: &'a EntryTable,
    key: &str,
    cancel: Option<&CancellationToken>,
) -> Result<Vec<&'a FileEntry>> {
    validate_tag_key(key)?;

    let mut matches = Vec::new();
    for file in table.files() {
        if let Some(token) = cancel {
            token.check()?;
        }
        if effective_tag(table, file, key).is_some() {
            matches.push(file);
        }
    }
    Ok(matches)
}
