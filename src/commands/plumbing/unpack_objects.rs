use crate::areas::repository::Repository;
use crate::artifacts::pack::pack_file::PackFile;
use bytes::Bytes;
use tracing::info;

impl Repository {
    /// Explode a pack into loose objects, returning how many were written
    pub fn unpack_objects(&self, data: Bytes) -> anyhow::Result<usize> {
        let pack = PackFile::parse(data, self.config())?;

        let objects = pack.objects()?;
        for (_, object) in &objects {
            self.database().put(object)?;
        }

        info!(objects = objects.len(), pack = %pack.checksum(), "unpacked objects");
        Ok(objects.len())
    }
}
