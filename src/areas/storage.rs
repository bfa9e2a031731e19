//! Byte storage capability
//!
//! Every other area reaches the filesystem through [`Storage`]. Paths are
//! relative to the storage root (the work tree; the git directory lives at
//! `.git/` inside it). Two implementations are provided:
//!
//! - [`FsStorage`]: the real filesystem, with atomic temp-file + rename writes
//! - [`MemoryStorage`]: an in-memory map, used by tests and embedders

use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::index::index_entry::EntryMetadata;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Contents of `path`, or `None` when it does not exist
    fn read(&self, path: &Path) -> anyhow::Result<Option<Bytes>>;

    /// Publish `data` at `path` atomically, creating missing directories
    fn write(&self, path: &Path, data: &[u8]) -> anyhow::Result<()>;

    /// Files below `dir`, recursively, relative to `dir` and sorted
    fn list(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>>;

    fn stat(&self, path: &Path) -> anyhow::Result<Option<EntryMetadata>>;

    /// Remove a file; removing a missing file is not an error
    fn remove(&self, path: &Path) -> anyhow::Result<()>;

    fn create_dir(&self, _path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> anyhow::Result<bool> {
        Ok(self.stat(path)?.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: Box<Path>,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsStorage {
            root: root.into().into_boxed_path(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> anyhow::Result<Option<Bytes>> {
        let full_path = self.root.join(path);

        let metadata = match std::fs::symlink_metadata(&full_path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => {
                return Err(error).context(format!("Unable to stat {}", full_path.display()));
            }
        };

        // a symlink's content is its target
        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&full_path)
                .context(format!("Unable to read link {}", full_path.display()))?;
            return Ok(Some(Bytes::from(
                target.to_string_lossy().into_owned().into_bytes(),
            )));
        }

        if metadata.is_dir() {
            return Ok(None);
        }

        std::fs::read(&full_path)
            .map(|content| Some(Bytes::from(content)))
            .context(format!("Unable to read file {}", full_path.display()))
    }

    fn write(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        let full_path = self.root.join(path);
        let parent = full_path
            .parent()
            .context(format!("Invalid path {}", full_path.display()))?;

        std::fs::create_dir_all(parent)
            .context(format!("Unable to create directory {}", parent.display()))?;

        let temp_path = parent.join(Self::generate_temp_name());
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .context(format!("Unable to open file {}", temp_path.display()))?;

        let published = file
            .write_all(data)
            .context(format!("Unable to write file {}", temp_path.display()))
            .and_then(|()| {
                drop(file);
                // rename the temp file to make the write atomic
                std::fs::rename(&temp_path, &full_path).context(format!(
                    "Unable to rename {} to {}",
                    temp_path.display(),
                    full_path.display()
                ))
            });

        if published.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        published
    }

    fn list(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let full_dir = self.root.join(dir);
        if !full_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&full_dir).sort_by_file_name() {
            let entry = entry.context(format!("Unable to list {}", full_dir.display()))?;
            if entry.file_type().is_dir() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&full_dir)
                .context(format!("Invalid entry {}", entry.path().display()))?;
            files.push(relative.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    fn stat(&self, path: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let full_path = self.root.join(path);

        match std::fs::symlink_metadata(&full_path) {
            Ok(metadata) => Ok(Some(EntryMetadata::try_from((full_path.as_path(), metadata))?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).context(format!("Unable to stat {}", full_path.display())),
        }
    }

    fn remove(&self, path: &Path) -> anyhow::Result<()> {
        let full_path = self.root.join(path);

        match std::fs::remove_file(&full_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error).context(format!("Unable to remove {}", full_path.display())),
        }
    }

    fn create_dir(&self, path: &Path) -> anyhow::Result<()> {
        let full_path = self.root.join(path);
        std::fs::create_dir_all(&full_path)
            .context(format!("Unable to create directory {}", full_path.display()))
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Bytes,
    mode: FileMode,
    ino: u64,
    mtime: i64,
}

/// In-memory storage
///
/// Each write gets a fresh inode number and a later modification time, so
/// stat-based change detection behaves as it would on disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<PathBuf, MemoryFile>>,
    clock: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    /// Change the mode reported by `stat` for an existing file
    pub fn set_mode(&self, path: &Path, mode: FileMode) -> anyhow::Result<()> {
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        let file = files
            .get_mut(path)
            .context(format!("No such file {}", path.display()))?;

        file.mode = mode;
        file.mtime = self.tick() as i64;
        Ok(())
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &Path) -> anyhow::Result<Option<Bytes>> {
        let files = self
            .files
            .read()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;

        Ok(files.get(path).map(|file| file.data.clone()))
    }

    fn write(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        let tick = self.tick();
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;

        let mode = files.get(path).map(|file| file.mode).unwrap_or_default();
        files.insert(
            path.to_path_buf(),
            MemoryFile {
                data: Bytes::copy_from_slice(data),
                mode,
                ino: tick,
                mtime: tick as i64,
            },
        );

        Ok(())
    }

    fn list(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let files = self
            .files
            .read()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;

        Ok(files
            .keys()
            .filter_map(|path| path.strip_prefix(dir).ok())
            .filter(|relative| !relative.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect())
    }

    fn stat(&self, path: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let files = self
            .files
            .read()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;

        Ok(files.get(path).map(|file| EntryMetadata {
            ctime: file.mtime,
            mtime: file.mtime,
            ino: file.ino,
            mode: EntryMode::File(file.mode),
            size: file.data.len() as u64,
            ..Default::default()
        }))
    }

    fn remove(&self, path: &Path) -> anyhow::Result<()> {
        let mut files = self
            .files
            .write()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;

        files.remove(path);
        Ok(())
    }
}
