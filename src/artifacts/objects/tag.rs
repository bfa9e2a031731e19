//! Git annotated tag object
//!
//! ## Format
//!
//! ```text
//! object <sha>
//! type <kind>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <message>
//! ```
//!
//! Very old tags carry no `tagger` line, so it is optional here.

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::commit::{Author, read_utf8, split_headers, write_header};
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use std::io::BufRead;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: String,
    tagger: Option<Author>,
    extra_headers: Vec<(String, String)>,
    message: String,
}

impl Tag {
    pub fn new(
        target: ObjectId,
        target_type: ObjectType,
        name: String,
        tagger: Option<Author>,
        message: String,
    ) -> Self {
        Tag {
            target,
            target_type,
            name,
            tagger,
            extra_headers: Vec::new(),
            message,
        }
    }

    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tagger(&self) -> Option<&Author> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Packable for Tag {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = String::new();

        write_header(&mut content, "object", &self.target.to_hex());
        write_header(&mut content, "type", self.target_type.as_str());
        write_header(&mut content, "tag", &self.name);
        if let Some(tagger) = &self.tagger {
            write_header(&mut content, "tagger", &tagger.display());
        }
        for (key, value) in &self.extra_headers {
            write_header(&mut content, key, value);
        }
        content.push('\n');
        content.push_str(&self.message);

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Tag {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = read_utf8(reader, "tag")?;
        let (headers, message) = split_headers(&content)?;
        let mut headers = headers.into_iter().peekable();

        let mut expect = |key: &str| match headers.next() {
            Some((found, value)) if found == key => Ok(value),
            _ => Err(GitError::format(format!(
                "invalid tag object: missing {key} line"
            ))),
        };

        let target = ObjectId::try_parse(expect("object")?)?;
        let target_type = ObjectType::try_from(expect("type")?.as_str())?;
        let name = expect("tag")?;

        let tagger = headers
            .next_if(|(key, _)| key == "tagger")
            .map(|(_, value)| Author::try_from(value.as_str()))
            .transpose()?;

        Ok(Tag {
            target,
            target_type,
            name,
            tagger,
            extra_headers: headers.collect(),
            message,
        })
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        self.serialize()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::commit::TimeZoneOffset;
    use std::io::Cursor;

    #[test]
    fn tag_round_trips_byte_for_byte() {
        let tag = Tag::new(
            ObjectId::digest(b"commit"),
            ObjectType::Commit,
            "v1.0".to_string(),
            Some(Author::new_with_timestamp(
                "Releaser".to_string(),
                "release@example.com".to_string(),
                1_600_000_000,
                TimeZoneOffset::utc(),
            )),
            "Release 1.0\n".to_string(),
        );

        let bytes = tag.serialize().unwrap();
        let parsed = Tag::deserialize(Cursor::new(bytes.clone())).unwrap();

        pretty_assertions::assert_eq!(parsed, tag);
        pretty_assertions::assert_eq!(parsed.serialize().unwrap(), bytes);
    }

    #[test]
    fn tagger_is_optional() {
        let raw = "object 4b825dc642cb6eb9a060e54bf8d69288fbee4904\ntype tree\ntag old\n\nancient\n";
        let tag = Tag::deserialize(Cursor::new(raw.as_bytes())).unwrap();

        assert!(tag.tagger().is_none());
        pretty_assertions::assert_eq!(tag.target_type(), ObjectType::Tree);
        pretty_assertions::assert_eq!(&tag.serialize().unwrap()[..], raw.as_bytes());
    }

    #[test]
    fn missing_type_is_a_format_error() {
        let raw = "object 4b825dc642cb6eb9a060e54bf8d69288fbee4904\ntag broken\n\nmsg";
        let error = Tag::deserialize(Cursor::new(raw.as_bytes())).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Format(_))
        ));
    }
}
