//! A repository: the stores of one git directory, composed
//!
//! Objects are read from the loose store first and then from every published
//! pack; both sit behind [`ObjectAccess`], so graph walking and peeling never
//! see where an object lives.

use crate::areas::database::Database;
use crate::areas::index::Index;
use crate::areas::packs::PackStore;
use crate::areas::refs::Refs;
use crate::areas::storage::{FsStorage, Storage};
use crate::artifacts::core::config::StoreConfig;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::revision::Revision;
use anyhow::Context;
use std::cell::{RefCell, RefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Git directory, relative to the work tree
pub const GIT_DIR: &str = ".git";

pub struct Repository {
    path: Box<Path>,
    storage: Arc<dyn Storage>,
    config: StoreConfig,
    writer: RefCell<Box<dyn std::io::Write>>,
    index: Arc<Mutex<Index>>,
    database: Database,
    packs: PackStore,
    refs: Refs,
}

impl Repository {
    /// Open the repository whose work tree is `path`, on the real filesystem
    ///
    /// Configuration comes from the `GITCORE_*` environment variables.
    pub fn new(path: &str, writer: Box<dyn std::io::Write>) -> anyhow::Result<Self> {
        let path = Path::new(path);
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
        }
        let path = path.canonicalize()?;

        let storage = Arc::new(FsStorage::new(path.clone()));
        Self::with_storage(path, storage, StoreConfig::load_from_env()?, writer)
    }

    /// Open a repository over any storage; paths inside it are relative to its root
    pub fn with_storage(
        path: impl Into<PathBuf>,
        storage: Arc<dyn Storage>,
        config: StoreConfig,
        writer: Box<dyn std::io::Write>,
    ) -> anyhow::Result<Self> {
        let git_dir = Path::new(GIT_DIR);
        let objects_dir = git_dir.join("objects");

        let index = Index::new(storage.clone(), git_dir.join("index"));
        let database = Database::new(storage.clone(), &objects_dir, config.compression_level);
        let packs = PackStore::new(storage.clone(), objects_dir.join("pack"), config.clone());
        let refs = Refs::new(storage.clone(), git_dir, config.max_symref_hops)?;

        Ok(Repository {
            path: path.into().into_boxed_path(),
            storage,
            config,
            writer: RefCell::new(writer),
            index: Arc::new(Mutex::new(index)),
            database,
            packs,
            refs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn writer(&'_ self) -> RefMut<'_, Box<dyn std::io::Write>> {
        self.writer.borrow_mut()
    }

    pub fn index(&self) -> Arc<Mutex<Index>> {
        self.index.clone()
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn packs(&self) -> &PackStore {
        &self.packs
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    /// Address named by a revision expression (`main`, `HEAD~2`, `abc123^`)
    pub fn resolve_revision(&self, expression: &str) -> anyhow::Result<ObjectId> {
        Revision::try_parse(expression, self.refs.validator())?.resolve(self)
    }

    /// Loose and packed objects whose address starts with `prefix`
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let mut matches = self.database.find_objects_by_prefix(prefix)?;
        matches.extend(self.packs.find_objects_by_prefix(prefix)?);
        matches.sort();
        matches.dedup();

        Ok(matches)
    }
}

impl ObjectAccess for Repository {
    fn read_object(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        match self.database.get(object_id) {
            Err(error) if GitError::is_not_found(&error) => self.packs.read_object(object_id),
            result => result,
        }
    }

    fn has_object(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        Ok(self.database.has(object_id)? || self.packs.has_object(object_id)?)
    }
}
