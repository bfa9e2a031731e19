//! Git index (staging area)
//!
//! The index caches, for every tracked path, the blob address and the stat
//! data the file had when it was staged. Comparing that cached stat against a
//! live one tells whether the file needs rehashing.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: Sorted list of tracked files with metadata
//! - Extensions: skipped when optional (signature starting with `A`..`Z`)
//! - Checksum: SHA-1 hash of the entire index for integrity verification
//!
//! ## Racy entries
//!
//! A file modified within the timestamp granularity of the index write can
//! keep stat data identical to the cached one. Entries whose mtime is not
//! older than the index file itself are therefore never trusted.

use crate::areas::storage::Storage;
use crate::artifacts::core::error::GitError;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{CHECKSUM_SIZE, HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use byteorder::ByteOrder;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const EXTENSION_HEADER_SIZE: usize = 8;

/// Git index (staging area)
#[derive(Debug)]
pub struct Index {
    storage: Arc<dyn Storage>,
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    /// Tracked files mapped by path
    entries: BTreeMap<String, IndexEntry>,
    /// Directory hierarchy for efficient parent-child lookups
    children: BTreeMap<String, BTreeSet<String>>,
    header: IndexHeader,
    /// Flag indicating if the index has been modified since loading
    changed: bool,
    /// `(mtime, mtime_nsec)` of the index file as last loaded or written
    snapshot: Option<(i64, i64)>,
}

impl Index {
    pub fn new(storage: Arc<dyn Storage>, path: impl Into<PathBuf>) -> Self {
        Index {
            storage,
            path: path.into().into_boxed_path(),
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
            snapshot: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_by_path(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Whether `path` is a tracked file or a directory holding tracked files
    pub fn is_directly_tracked(&self, path: &str) -> bool {
        self.entries.contains_key(path) || self.children.contains_key(path)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = false;
        self.snapshot = None;
    }

    /// Load the index from storage
    ///
    /// A missing or empty index file leaves the index empty.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();

        let Some(data) = self.storage.read(&self.path)? else {
            return Ok(());
        };
        if data.is_empty() {
            return Ok(());
        }

        let mut reader = Checksum::new(Cursor::new(&data[..]));
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;
        Self::skip_extensions(&mut reader, data.len())?;
        reader.verify()?;

        self.snapshot = self.index_mtime()?;
        debug!(path = %self.path.display(), entries = entries_count, "loaded index");

        Ok(())
    }

    fn parse_header(&self, reader: &mut Checksum<Cursor<&[u8]>>) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(Cursor::new(header_bytes))?;

        if header.marker != SIGNATURE {
            anyhow::bail!(GitError::format("invalid index file signature"));
        }

        if header.version != VERSION {
            anyhow::bail!(GitError::format(format!(
                "unsupported index file version: {}",
                header.version
            )));
        }

        Ok(header.entries_count)
    }

    /// Read each entry, extending by 8-byte blocks until the NUL padding
    fn parse_entries(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<Cursor<&[u8]>>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(Cursor::new(Bytes::from(entry_bytes)))?;
            self.store_entry(entry);
        }

        self.header.entries_count = entries_count;

        Ok(())
    }

    fn skip_extensions(
        reader: &mut Checksum<Cursor<&[u8]>>,
        total: usize,
    ) -> anyhow::Result<()> {
        while (reader.get_ref().position() as usize) + CHECKSUM_SIZE < total {
            let header = reader.read(EXTENSION_HEADER_SIZE)?;
            let signature = &header[0..4];
            let size = byteorder::NetworkEndian::read_u32(&header[4..8]) as usize;

            if !signature[0].is_ascii_uppercase() {
                anyhow::bail!(GitError::format(format!(
                    "unsupported mandatory index extension {}",
                    String::from_utf8_lossy(signature)
                )));
            }

            debug!(extension = %String::from_utf8_lossy(signature), size, "skipping index extension");
            reader.read(size)?;
        }

        Ok(())
    }

    fn index_mtime(&self) -> anyhow::Result<Option<(i64, i64)>> {
        Ok(self
            .storage
            .stat(&self.path)?
            .map(|stat| (stat.mtime, stat.mtime_nsec)))
    }

    /// Whether `entry` was modified too close to the index write to trust its stat
    pub fn is_racily_clean(&self, entry: &IndexEntry) -> bool {
        self.snapshot.is_some_and(|snapshot| {
            (entry.metadata.mtime, entry.metadata.mtime_nsec) >= snapshot
        })
    }

    /// Remove any conflicting entries before adding a new entry
    ///
    /// A file replaces directory entries of the same name and the other way
    /// around.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(entry.name.clone());
        }

        self.entries.insert(entry.name.clone(), entry);
    }

    fn remove_children(&mut self, path_name: &str) {
        if let Some(children) = self.children.remove(path_name) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path_name: &str) {
        let Some(entry) = self.entries.remove(path_name) else {
            return;
        };

        for parent in entry.parent_dirs() {
            if let Some(children) = self.children.get_mut(parent) {
                children.remove(path_name);
                if children.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    pub fn add(&mut self, entry: IndexEntry) {
        self.discard_conflicts(&entry);
        self.store_entry(entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    pub fn remove(&mut self, path: &str) {
        self.remove_entry(path);
        self.remove_children(path);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;
    }

    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let mut writer = Checksum::new(Vec::new());

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..self.header.clone()
        };
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        self.storage.write(&self.path, &writer.into_inner())?;

        self.changed = false;
        self.snapshot = self.index_mtime()?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "wrote index");

        Ok(())
    }

    /// Replace the cached stat of a tracked path
    pub fn update_entry_stat(&mut self, path: &str, stat: EntryMetadata) {
        if let Some(existing_entry) = self.entries.get_mut(path) {
            existing_entry.metadata = stat;
            self.changed = true;
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }
}
