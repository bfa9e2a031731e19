use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::pack::pack_file::PackFile;
use crate::artifacts::pack::pack_index::PackIndex;
use anyhow::Context;
use std::path::Path;

impl Repository {
    /// Check a pack against its index; `path` may name either file
    ///
    /// With `verbose`, every entry is listed as
    /// `<oid> <type> <size> <packed-size> <offset> [<depth> <base>]`.
    pub fn verify_pack(&self, path: &Path, verbose: bool) -> anyhow::Result<()> {
        let pack_path = path.with_extension("pack");
        let index_path = path.with_extension("idx");

        let data = self
            .storage()
            .read(&pack_path)?
            .ok_or_else(|| GitError::not_found(format!("pack {}", pack_path.display())))?;
        let index_data = self
            .storage()
            .read(&index_path)?
            .ok_or_else(|| GitError::not_found(format!("pack index {}", index_path.display())))?;

        let index = PackIndex::parse(&index_data)
            .with_context(|| format!("invalid pack index {}", index_path.display()))?;
        let pack = PackFile::with_index(data, index, self.config())?;
        pack.verify()
            .with_context(|| format!("{} is corrupt", pack_path.display()))?;

        if verbose {
            for entry in pack.describe()? {
                write!(
                    self.writer(),
                    "{} {} {} {} {}",
                    entry.oid, entry.object_type, entry.size, entry.packed_size, entry.offset
                )?;
                match entry.base {
                    Some(base) => writeln!(self.writer(), " {} {base}", entry.depth)?,
                    None => writeln!(self.writer())?,
                }
            }
        }
        writeln!(self.writer(), "{}: ok", pack_path.display())?;

        Ok(())
    }
}
