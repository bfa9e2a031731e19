//! Loose object store
//!
//! Objects live at `.git/objects/<2 hex>/<38 hex>` as zlib streams of the
//! loose form `"<kind> <len>\0<payload>"`. Writes go through the storage's
//! atomic publish and never touch an object that already exists.

use crate::areas::storage::Storage;
use crate::artifacts::core::compression;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object::{Object, RawObject};
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Database {
    storage: Arc<dyn Storage>,
    path: Box<Path>,
    compression_level: u32,
}

impl Database {
    pub fn new(storage: Arc<dyn Storage>, path: impl Into<PathBuf>, compression_level: u32) -> Self {
        Database {
            storage,
            path: path.into().into_boxed_path(),
            compression_level,
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Store a typed object, returning its address
    pub fn store(&self, object: &dyn Object) -> anyhow::Result<ObjectId> {
        self.put(&object.to_raw()?)
    }

    /// Store a raw object; storing an existing address is a no-op
    pub fn put(&self, object: &RawObject) -> anyhow::Result<ObjectId> {
        let object_id = object.oid();
        let object_path = self.path.join(object_id.to_path());

        // write the object unless it already exists
        if self.storage.exists(&object_path)? {
            debug!(oid = %object_id, "loose object already present");
            return Ok(object_id);
        }

        let compressed = compression::compress(&object.to_loose(), self.compression_level)?;
        self.storage
            .write(&object_path, &compressed)
            .context(format!("Unable to write object {object_id}"))?;
        debug!(oid = %object_id, kind = %object.object_type, size = object.size(), "stored loose object");

        Ok(object_id)
    }

    /// Read and verify a loose object
    pub fn get(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        let object_path = self.path.join(object_id.to_path());
        let compressed = self
            .storage
            .read(&object_path)?
            .ok_or_else(|| GitError::not_found(format!("object {object_id}")))?;

        let content = compression::decompress(&compressed)
            .context(format!("Unable to decompress object {object_id}"))?;
        let object = RawObject::from_loose(&content)
            .context(format!("Malformed object {object_id}"))?;

        let actual = object.oid();
        if actual != *object_id {
            warn!(expected = %object_id, actual = %actual, "loose object failed verification");
            anyhow::bail!(GitError::integrity(object_id, &actual));
        }

        Ok(object)
    }

    pub fn has(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        self.storage.exists(&self.path.join(object_id.to_path()))
    }

    /// Every loose object address, in sorted order
    pub fn list(&self) -> anyhow::Result<Vec<ObjectId>> {
        Ok(self
            .storage
            .list(&self.path)?
            .into_iter()
            .filter_map(|path| Self::object_id_from_path(&path))
            .collect())
    }

    /// Find all objects whose OID starts with the given prefix.
    ///
    /// This method searches the object database for all objects whose OID begins
    /// with the specified prefix. It's used to resolve abbreviated OIDs to their
    /// full form.
    ///
    /// # Returns
    ///
    /// A vector of all matching ObjectIds. If no matches are found, returns an empty vector.
    /// If multiple matches are found, all are returned (indicating an ambiguous prefix).
    ///
    /// # Performance
    ///
    /// - For prefixes of 2+ characters, only searches the specific directory
    /// - For prefixes of 0-1 characters, must search all directories (slower)
    pub fn find_objects_by_prefix(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();

        if prefix.len() >= 2 {
            let dir_name = &prefix[..2];
            let file_prefix = &prefix[2..];

            return Ok(self
                .storage
                .list(&self.path.join(dir_name))?
                .into_iter()
                .filter(|file| file.to_string_lossy().starts_with(file_prefix))
                .filter_map(|file| ObjectId::try_parse(format!("{}{}", dir_name, file.display())).ok())
                .collect());
        }

        Ok(self
            .list()?
            .into_iter()
            .filter(|oid| oid.to_hex().starts_with(&prefix))
            .collect())
    }

    fn object_id_from_path(path: &Path) -> Option<ObjectId> {
        let mut components = path.components();
        let dir = components.next()?.as_os_str().to_str()?;
        let file = components.next()?.as_os_str().to_str()?;
        if components.next().is_some() || dir.len() != 2 {
            return None;
        }

        ObjectId::try_parse(format!("{dir}{file}")).ok()
    }
}

impl ObjectAccess for Database {
    fn read_object(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        self.get(object_id)
    }

    fn has_object(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        self.has(object_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::storage::MemoryStorage;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object_type::ObjectType;
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    #[fixture]
    fn storage() -> Arc<MemoryStorage> {
        Arc::new(MemoryStorage::new())
    }

    fn database(storage: &Arc<MemoryStorage>) -> Database {
        Database::new(storage.clone(), ".git/objects", 6)
    }

    #[rstest]
    fn put_hello_blob_and_read_it_back(storage: Arc<MemoryStorage>) {
        let database = database(&storage);
        let oid = database.store(&Blob::from("hello")).unwrap();

        pretty_assertions::assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        assert!(
            storage
                .exists(Path::new(".git/objects/b6/fc4c620b67d95f953a5c1c1230aaab5db5a1b0"))
                .unwrap()
        );

        let object = database.get(&oid).unwrap();
        pretty_assertions::assert_eq!(object.object_type, ObjectType::Blob);
        pretty_assertions::assert_eq!(object.data, Bytes::from_static(b"hello"));
    }

    #[rstest]
    fn put_is_idempotent(storage: Arc<MemoryStorage>) {
        let database = database(&storage);
        let raw = RawObject::new(ObjectType::Blob, Bytes::from_static(b"same"));

        let first = database.put(&raw).unwrap();
        let stat = storage.stat(&database.objects_path().join(first.to_path())).unwrap();
        let second = database.put(&raw).unwrap();

        pretty_assertions::assert_eq!(first, second);
        // the existing file was not rewritten
        pretty_assertions::assert_eq!(
            storage.stat(&database.objects_path().join(first.to_path())).unwrap(),
            stat
        );
    }

    #[rstest]
    fn missing_object_is_not_found(storage: Arc<MemoryStorage>) {
        let database = database(&storage);
        let error = database.get(&ObjectId::digest(b"nothing")).unwrap_err();

        assert!(GitError::is_not_found(&error));
        assert!(!database.has(&ObjectId::digest(b"nothing")).unwrap());
    }

    #[rstest]
    fn object_stored_under_wrong_address_fails_integrity(storage: Arc<MemoryStorage>) {
        let database = database(&storage);
        let wrong = ObjectId::digest(b"elsewhere");
        let content = RawObject::new(ObjectType::Blob, Bytes::from_static(b"hello")).to_loose();
        storage
            .write(
                &database.objects_path().join(wrong.to_path()),
                &compression::compress(&content, 6).unwrap(),
            )
            .unwrap();

        let error = database.get(&wrong).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Integrity { .. })
        ));
    }

    #[rstest]
    fn prefix_lookup_finds_candidates(storage: Arc<MemoryStorage>) {
        let database = database(&storage);
        let oid = database.store(&Blob::from("hello")).unwrap();
        database.store(&Blob::from("world")).unwrap();

        pretty_assertions::assert_eq!(database.find_objects_by_prefix("b6fc4").unwrap(), vec![oid]);
        pretty_assertions::assert_eq!(database.find_objects_by_prefix("b").unwrap(), vec![oid]);
        assert!(database.find_objects_by_prefix("0000").unwrap().is_empty());
        pretty_assertions::assert_eq!(database.list().unwrap().len(), 2);
    }
}
