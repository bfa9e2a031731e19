use crate::areas::repository::Repository;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object_type::ObjectType;

/// What `cat-file` prints about an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatFileMode {
    /// Contents, with trees listed one entry per line
    Pretty,
    Type,
    Size,
}

impl Repository {
    pub fn cat_file(&self, revision: &str, mode: CatFileMode) -> anyhow::Result<()> {
        let object_id = self.resolve_revision(revision)?;
        let object = self.read_object(&object_id)?;

        match mode {
            CatFileMode::Type => writeln!(self.writer(), "{}", object.object_type)?,
            CatFileMode::Size => writeln!(self.writer(), "{}", object.size())?,
            CatFileMode::Pretty if object.object_type == ObjectType::Blob => {
                self.writer().write_all(&object.data)?
            }
            CatFileMode::Pretty if object.object_type == ObjectType::Tree => {
                let listing = object.parse()?.as_object().display();
                if !listing.is_empty() {
                    writeln!(self.writer(), "{listing}")?
                }
            }
            CatFileMode::Pretty => self.writer().write_all(&object.data)?,
        }

        Ok(())
    }
}
