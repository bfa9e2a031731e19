use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::pack_file::PackFile;
use anyhow::Context;
use std::path::Path;
use tracing::info;

impl Repository {
    /// Derive the `.idx` for a pack file and write it next to the pack
    pub fn index_pack(&self, pack_path: &Path) -> anyhow::Result<ObjectId> {
        let data = self
            .storage()
            .read(pack_path)?
            .ok_or_else(|| GitError::not_found(format!("pack {}", pack_path.display())))?;

        let pack = PackFile::parse(data, self.config())
            .with_context(|| format!("failed to index {}", pack_path.display()))?;

        let index_path = pack_path.with_extension("idx");
        self.storage()
            .write(&index_path, &pack.index().serialize()?)
            .with_context(|| format!("failed to write {}", index_path.display()))?;

        info!(pack = %pack_path.display(), objects = pack.len(), "indexed pack");
        writeln!(self.writer(), "{}", pack.checksum())?;

        Ok(*pack.checksum())
    }
}
