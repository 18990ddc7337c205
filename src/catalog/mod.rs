//! Entry table: ordered file and directory records keyed by path

pub mod entry;

pub use entry::{type_codes, DirectoryEntry, Entry, EntryKind, FileEntry};

use crate::codec::ByteReader;
use crate::error::{NovusPackError, Result};
use ahash::AHashMap;

/// Ordered entry table with a path index
///
/// Iteration follows insertion order, which is also the on-disk order.
/// Paths are unique; callers normalize before inserting.
#[derive(Debug, Clone, Default)]
pub struct EntryTable {
    entries: Vec<Entry>,
    index: AHashMap<String, usize>,
}

impl EntryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Append an entry, rejecting path collisions
    pub fn insert(&mut self, entry: Entry) -> Result<()> {
        if self.index.contains_key(entry.path()) {
            return Err(NovusPackError::validation(
                "path",
                format!("entry '{}' already exists", entry.path()),
            ));
        }
        self.index.insert(entry.path().to_string(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Remove an entry, preserving the order of the rest
    pub fn remove(&mut self, path: &str) -> Result<Entry> {
        let idx = self
            .index
            .remove(path)
            .ok_or_else(|| NovusPackError::not_found(path))?;
        let entry = self.entries.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Ok(entry)
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Entry> {
        match self.index.get(path) {
            Some(&i) => self.entries.get_mut(i),
            None => None,
        }
    }

    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.get(path).and_then(Entry::as_file)
    }

    pub fn file_mut(&mut self, path: &str) -> Option<&mut FileEntry> {
        match self.get_mut(path) {
            Some(Entry::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn directory(&self, path: &str) -> Option<&DirectoryEntry> {
        self.get(path).and_then(Entry::as_directory)
    }

    pub fn directory_mut(&mut self, path: &str) -> Option<&mut DirectoryEntry> {
        match self.get_mut(path) {
            Some(Entry::Directory(d)) => Some(d),
            _ => None,
        }
    }

    /// Position of `path` in table order
    pub fn position(&self, path: &str) -> Option<usize> {
        self.index.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.entries.iter_mut()
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter_map(Entry::as_file)
    }

    pub fn directories(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter_map(Entry::as_directory)
    }

    /// Number of files with ordinary (non-reserved) type codes
    pub fn ordinary_file_count(&self) -> usize {
        self.files().filter(|f| !f.is_special()).count()
    }

    /// Encode all records, returning the bytes and each record's start
    /// offset relative to `base`
    pub fn encode(&self, base: u64) -> Result<(Vec<u8>, Vec<u64>)> {
        let mut out = Vec::new();
        let mut offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            offsets.push(base + out.len() as u64);
            entry.encode(&mut out)?;
        }
        Ok((out, offsets))
    }

    /// Absolute start offset of every record, in table order
    pub fn record_offsets(&self, base: u64) -> Result<Vec<u64>> {
        Ok(self.encode(base)?.1)
    }

    /// Decode records until `bytes` is exhausted
    ///
    /// `base` is the absolute offset of `bytes[0]`. Returns the table and
    /// the start offset of each record.
    pub fn decode(bytes: &[u8], base: u64) -> Result<(Self, Vec<u64>)> {
        let mut reader = ByteReader::new(bytes, base);
        let mut table = EntryTable::new();
        let mut offsets = Vec::new();

        while !reader.is_empty() {
            let offset = reader.offset();
            let entry = Entry::decode(&mut reader)?;
            if table.contains(entry.path()) {
                return Err(NovusPackError::Encoding(format!(
                    "duplicate entry path '{}' at offset {}",
                    entry.path(),
                    offset
                )));
            }
            table.insert(entry)?;
            offsets.push(offset);
        }

        Ok((table, offsets))
    }
}
