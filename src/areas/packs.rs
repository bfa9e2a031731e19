//! Published packs
//!
//! Packs live under `.git/objects/pack/` as `pack-<checksum>.pack` with a
//! `pack-<checksum>.idx` next to them. A pack whose index is missing is still
//! readable; its index is derived when the pack is opened.

use crate::areas::storage::Storage;
use crate::artifacts::core::config::StoreConfig;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::pack_file::PackFile;
use crate::artifacts::pack::pack_index::PackIndex;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

const PACK_EXTENSION: &str = "pack";
const INDEX_EXTENSION: &str = "idx";

#[derive(Debug)]
pub struct PackStore {
    storage: Arc<dyn Storage>,
    /// Path to the pack directory (typically `.git/objects/pack`)
    path: Box<Path>,
    config: StoreConfig,
    /// Opened on first use
    packs: RwLock<Option<Vec<Arc<PackFile>>>>,
}

impl PackStore {
    pub fn new(storage: Arc<dyn Storage>, path: impl Into<PathBuf>, config: StoreConfig) -> Self {
        PackStore {
            storage,
            path: path.into().into_boxed_path(),
            config,
            packs: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every published pack, opening them on first call
    pub fn packs(&self) -> anyhow::Result<Vec<Arc<PackFile>>> {
        {
            let packs = self
                .packs
                .read()
                .map_err(|_| anyhow::anyhow!("pack list lock poisoned"))?;
            if let Some(packs) = packs.as_ref() {
                return Ok(packs.clone());
            }
        }

        let loaded = self.load()?;
        let mut packs = self
            .packs
            .write()
            .map_err(|_| anyhow::anyhow!("pack list lock poisoned"))?;
        *packs = Some(loaded.clone());

        Ok(loaded)
    }

    fn load(&self) -> anyhow::Result<Vec<Arc<PackFile>>> {
        let mut packs = Vec::new();

        for file in self.storage.list(&self.path)? {
            if file.extension().and_then(|ext| ext.to_str()) != Some(PACK_EXTENSION)
                || file.components().count() != 1
            {
                continue;
            }

            let pack_path = self.path.join(&file);
            let data = self
                .storage
                .read(&pack_path)?
                .ok_or_else(|| GitError::not_found(format!("pack {}", pack_path.display())))?;

            let index_path = pack_path.with_extension(INDEX_EXTENSION);
            let pack = match self.storage.read(&index_path)? {
                Some(index_data) => {
                    let index = PackIndex::parse(&index_data)
                        .with_context(|| format!("invalid pack index {}", index_path.display()))?;
                    PackFile::with_index(data, index, &self.config)?
                }
                None => {
                    debug!(pack = %pack_path.display(), "pack has no index, deriving one");
                    PackFile::parse(data, &self.config)?
                }
            };

            packs.push(Arc::new(pack));
        }

        debug!(count = packs.len(), path = %self.path.display(), "opened packs");
        Ok(packs)
    }

    /// Write a decoded pack and its index, making its objects readable
    ///
    /// The pack is written before its index, so a reader never sees an index
    /// without its pack.
    pub fn publish(&self, pack: PackFile) -> anyhow::Result<Arc<PackFile>> {
        let name = format!("pack-{}", pack.checksum());
        let pack_path = self.path.join(format!("{name}.{PACK_EXTENSION}"));
        let index_path = self.path.join(format!("{name}.{INDEX_EXTENSION}"));

        self.storage
            .write(&pack_path, pack.data())
            .with_context(|| format!("failed to write {}", pack_path.display()))?;
        self.storage
            .write(&index_path, &pack.index().serialize()?)
            .with_context(|| format!("failed to write {}", index_path.display()))?;

        let pack = Arc::new(pack);
        let mut packs = self
            .packs
            .write()
            .map_err(|_| anyhow::anyhow!("pack list lock poisoned"))?;
        if let Some(packs) = packs.as_mut()
            && !packs.iter().any(|known| known.checksum() == pack.checksum())
        {
            packs.push(pack.clone());
        }

        info!(pack = %name, objects = pack.len(), "published pack");
        Ok(pack)
    }

    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let mut matches = Vec::new();

        for pack in self.packs()? {
            matches.extend(
                pack.index()
                    .entries()
                    .iter()
                    .map(|entry| entry.oid)
                    .filter(|oid| oid.to_hex().starts_with(&prefix)),
            );
        }

        matches.sort();
        matches.dedup();
        Ok(matches)
    }
}

impl ObjectAccess for PackStore {
    fn read_object(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        for pack in self.packs()? {
            if pack.contains(object_id) {
                return pack.read(object_id);
            }
        }

        anyhow::bail!(GitError::not_found(format!("object {object_id}")))
    }

    fn has_object(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        Ok(self.packs()?.iter().any(|pack| pack.contains(object_id)))
    }
}
