//! Git tree object
//!
//! Trees represent directory snapshots in Git. They contain entries for files (blobs),
//! subdirectories (other trees) and gitlinks, along with their names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! ## Ordering
//!
//! Entries are sorted by name bytes, with directory names compared as if they
//! ended in `/`. A tree read from disk keeps the order it was stored in, but
//! serializing always emits the canonical order.

use crate::artifacts::core::error::GitError;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub mode: EntryMode,
    /// Raw path segment; git does not require it to be UTF-8
    #[new(into)]
    pub name: Bytes,
    pub oid: ObjectId,
}

impl TreeEntry {
    /// Canonical tree ordering (`name` or `name/` for directories)
    pub fn canonical_cmp(&self, other: &TreeEntry) -> Ordering {
        let key = |entry: &TreeEntry| {
            entry
                .name
                .iter()
                .copied()
                .chain(entry.mode.is_tree().then_some(b'/'))
                .collect::<Vec<u8>>()
        };
        key(self).cmp(&key(other))
    }
}

/// Git tree object representing a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Build a tree, normalizing entries into canonical order
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(TreeEntry::canonical_cmp);
        Tree { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> impl Iterator<Item = TreeEntry> {
        self.entries.into_iter()
    }

    pub fn entry(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn is_sorted(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].canonical_cmp(&pair[1]) != Ordering::Greater)
    }

    /// A copy of this tree in canonical order
    pub fn normalized(&self) -> Tree {
        Tree::new(self.entries.clone())
    }

    fn validate_name(name: &[u8]) -> anyhow::Result<()> {
        if name.is_empty() || name.contains(&b'/') || name == b"." || name == b".." {
            anyhow::bail!(GitError::format(format!(
                "invalid tree entry name {:?}",
                String::from_utf8_lossy(name)
            )));
        }
        Ok(())
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut ordered = self.entries.iter().collect::<Vec<_>>();
        ordered.sort_by(|a, b| a.canonical_cmp(b));

        let mut content_bytes = Vec::new();
        for entry in ordered {
            write!(content_bytes, "{} ", entry.mode.as_str())?;
            content_bytes.extend_from_slice(&entry.name);
            content_bytes.push(0);
            entry.oid.write_h40_to(&mut content_bytes)?;
        }

        Ok(Bytes::from(content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = Vec::new();
        let mut reader = reader;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            // Read "mode " (space-delimited)
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                anyhow::bail!(GitError::format("unexpected end of tree entry mode"));
            }

            let mode_str = std::str::from_utf8(&mode_bytes)
                .map_err(|_| GitError::format("tree entry mode is not ASCII"))?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            // Read "name\0"
            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || name_bytes.pop() != Some(b'\0') {
                anyhow::bail!(GitError::format("unexpected end of tree entry name"));
            }
            Self::validate_name(&name_bytes)?;
            let name = Bytes::copy_from_slice(&name_bytes);

            let oid = ObjectId::read_h40_from(&mut reader).map_err(|_| {
                GitError::format(format!(
                    "tree entry {:?} is missing its object id",
                    String::from_utf8_lossy(&name)
                ))
            })?;

            entries.push(TreeEntry::new(mode, name, oid));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "{:06o} {} {}\t{}",
                    entry.mode.as_u32(),
                    entry.mode.object_type(),
                    entry.oid,
                    String::from_utf8_lossy(&entry.name)
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}
