use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::object::{ObjectBox, RawObject};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use std::path::Path;

impl Repository {
    /// Address of a file's content as an object of `object_type`
    ///
    /// Anything other than a blob must parse as that kind. With `write`, the
    /// object is also stored.
    pub fn hash_object(
        &self,
        object_path: &str,
        object_type: ObjectType,
        write: bool,
    ) -> anyhow::Result<ObjectId> {
        let data = self
            .storage()
            .read(Path::new(object_path))?
            .ok_or_else(|| GitError::not_found(format!("file {object_path}")))?;

        if object_type != ObjectType::Blob {
            ObjectBox::decode(object_type, &data)?;
        }

        let object = RawObject::new(object_type, data);
        let object_id = if write {
            self.database().put(&object)?
        } else {
            object.oid()
        };

        writeln!(self.writer(), "{object_id}")?;

        Ok(object_id)
    }
}
