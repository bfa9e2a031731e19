use crate::areas::repository::Repository;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object_id::ObjectId;

impl Repository {
    /// Point `name` (or the end of its symbolic chain) at `new_value`
    ///
    /// A short `name` must name an existing reference. `old_value`, when given,
    /// must be a full address the reference currently holds; all zeros means
    /// the reference must not exist.
    pub fn update_ref(
        &self,
        name: &str,
        new_value: &str,
        old_value: Option<&str>,
    ) -> anyhow::Result<()> {
        let new_oid = self.resolve_revision(new_value)?;
        if !self.has_object(&new_oid)? {
            anyhow::bail!(GitError::not_found(format!("object {new_oid}")));
        }
        let expected = old_value.map(|value| ObjectId::try_parse(value)).transpose()?;
        let name = self.refs().full_name(name)?;

        self.refs().update_ref(&name, new_oid, expected)
    }

    pub fn delete_ref(&self, name: &str, old_value: Option<&str>) -> anyhow::Result<()> {
        let expected = old_value.map(|value| ObjectId::try_parse(value)).transpose()?;
        let name = self.refs().full_name(name)?;

        self.refs().delete_ref(&name, expected)
    }
}
