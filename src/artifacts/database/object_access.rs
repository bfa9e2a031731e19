//! Read access to objects, independent of where they are stored
//!
//! The loose store, a single pack and the repository (loose first, then every
//! published pack) all implement [`ObjectAccess`]. Graph walking and reference
//! peeling only ever see this trait.

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{ObjectBox, RawObject, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use std::io::Cursor;

pub trait ObjectAccess {
    /// Kind and payload of `object_id`; `GitError::NotFound` when absent
    fn read_object(&self, object_id: &ObjectId) -> anyhow::Result<RawObject>;

    fn has_object(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        match self.read_object(object_id) {
            Ok(_) => Ok(true),
            Err(error) if GitError::is_not_found(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        self.read_object(object_id)?.parse()
    }

    fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        let raw = self.read_object(object_id)?;

        match raw.object_type {
            ObjectType::Commit => Ok(Some(Commit::deserialize(Cursor::new(raw.data))?)),
            _ => Ok(None),
        }
    }

    fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        let raw = self.read_object(object_id)?;

        match raw.object_type {
            ObjectType::Tree => Ok(Some(Tree::deserialize(Cursor::new(raw.data))?)),
            _ => Ok(None),
        }
    }

    /// Follow annotated tags until something that is not a tag
    fn peel(&self, object_id: &ObjectId) -> anyhow::Result<(ObjectId, ObjectType)> {
        let mut current = *object_id;
        let mut seen = std::collections::HashSet::new();

        loop {
            if !seen.insert(current) {
                anyhow::bail!(GitError::Loop(format!("tag chain revisits {current}")));
            }

            let raw = self.read_object(&current)?;
            if raw.object_type != ObjectType::Tag {
                return Ok((current, raw.object_type));
            }

            let tag = Tag::deserialize(Cursor::new(raw.data))?;
            current = *tag.target();
        }
    }
}
