use crate::areas::repository::Repository;

impl Repository {
    /// Move every loose reference into `packed-refs`, printing how many moved
    pub fn pack_refs(&self) -> anyhow::Result<usize> {
        let packed = self.refs().pack_refs()?;
        writeln!(self.writer(), "packed {packed} refs")?;

        Ok(packed)
    }
}
