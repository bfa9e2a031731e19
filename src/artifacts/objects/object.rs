use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::Result;
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Cursor};

/// Serialize an object payload (everything after the `"<kind> <len>\0"` header)
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

/// Parse an object payload; the header has already been consumed
pub trait Unpackable {
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    /// Canonical loose form and its address
    fn encode(&self) -> Result<(Bytes, ObjectId)> {
        let raw = self.to_raw()?;
        Ok((raw.to_loose(), raw.oid()))
    }

    fn object_id(&self) -> Result<ObjectId> {
        Ok(ObjectId::for_object(self.object_type(), &self.serialize()?))
    }

    fn to_raw(&self) -> Result<RawObject> {
        Ok(RawObject::new(self.object_type(), self.serialize()?))
    }
}

/// An object as stored: its kind and undecoded payload
///
/// This is what both the loose store and the pack decoder hand out; parsing
/// into a typed object is a separate step.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RawObject {
    pub object_type: ObjectType,
    pub data: Bytes,
}

impl RawObject {
    pub fn oid(&self) -> ObjectId {
        ObjectId::for_object(self.object_type, &self.data)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Parse the loose form `"<kind> <len>\0<payload>"`
    pub fn from_loose(content: &[u8]) -> Result<Self> {
        let (object_type, size, header_len) = ObjectType::parse_header(content)?;
        let payload = &content[header_len..];
        if payload.len() != size {
            anyhow::bail!(GitError::format(format!(
                "object header declares {size} bytes but payload has {}",
                payload.len()
            )));
        }

        Ok(RawObject::new(object_type, Bytes::copy_from_slice(payload)))
    }

    pub fn to_loose(&self) -> Bytes {
        let header = format!("{} {}\0", self.object_type.as_str(), self.data.len());
        let mut loose = Vec::with_capacity(header.len() + self.data.len());
        loose.extend_from_slice(header.as_bytes());
        loose.extend_from_slice(&self.data);
        loose.into()
    }

    pub fn parse(&self) -> Result<ObjectBox> {
        ObjectBox::decode(self.object_type, &self.data)
    }
}

/// A decoded object of any kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn decode(object_type: ObjectType, payload: &[u8]) -> Result<Self> {
        let reader = Cursor::new(payload);
        Ok(match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(reader)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(reader)?)),
            ObjectType::Commit => ObjectBox::Commit(Box::new(Commit::deserialize(reader)?)),
            ObjectType::Tag => ObjectBox::Tag(Box::new(Tag::deserialize(reader)?)),
        })
    }

    pub fn as_object(&self) -> &dyn Object {
        match self {
            ObjectBox::Blob(blob) => blob.as_ref(),
            ObjectBox::Tree(tree) => tree.as_ref(),
            ObjectBox::Commit(commit) => commit.as_ref(),
            ObjectBox::Tag(tag) => tag.as_ref(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.as_object().object_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_form_round_trips() {
        let raw = RawObject::new(ObjectType::Blob, Bytes::from_static(b"hello"));
        let loose = raw.to_loose();

        pretty_assertions::assert_eq!(&loose[..], b"blob 5\0hello");
        pretty_assertions::assert_eq!(RawObject::from_loose(&loose).unwrap(), raw);
    }

    #[test]
    fn size_mismatch_is_a_format_error() {
        let error = RawObject::from_loose(b"blob 7\0hello").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Format(_))
        ));
    }
}
