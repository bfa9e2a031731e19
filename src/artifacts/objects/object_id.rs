//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 20-byte SHA-1 digests, rendered as 40 lowercase hexadecimal
//! characters. They uniquely identify all objects in Git (blobs, trees, commits, tags).
//!
//! ## Storage
//!
//! Loose objects are stored in `objects/<first-2-chars>/<remaining-38-chars>`.
//! The split is only a directory fan-out, not a property of the address.

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::{OBJECT_ID_BYTES, OBJECT_ID_LENGTH};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Git object identifier (SHA-1 hash)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_BYTES]);

impl ObjectId {
    /// Parse and validate an object ID from its 40-character hex form
    pub fn try_parse(id: impl AsRef<str>) -> anyhow::Result<Self> {
        let id = id.as_ref();
        if id.len() != OBJECT_ID_LENGTH {
            anyhow::bail!(GitError::format(format!(
                "invalid object ID length: {}",
                id.len()
            )));
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!(GitError::format(format!(
                "invalid object ID characters: {id}"
            )));
        }

        let mut bytes = [0u8; OBJECT_ID_BYTES];
        hex::decode_to_slice(id, &mut bytes)
            .map_err(|e| GitError::format(format!("invalid object ID {id}: {e}")))?;
        Ok(Self(bytes))
    }

    /// Build an object ID from its raw 20-byte form
    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let bytes: [u8; OBJECT_ID_BYTES] = bytes.try_into().map_err(|_| {
            GitError::format(format!("invalid raw object ID length: {}", bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    /// SHA-1 of an arbitrary byte sequence
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Address of an object: SHA-1 over `"<kind> <len>\0<payload>"`
    pub fn for_object(object_type: ObjectType, payload: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type.as_str(), payload.len()).as_bytes());
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_BYTES] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree entries and pack/index records.
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut bytes = [0u8; OBJECT_ID_BYTES];
        reader
            .read_exact(&mut bytes)
            .map_err(|_| GitError::format("unexpected end of data in object ID"))?;
        Ok(Self(bytes))
    }

    /// Convert to the loose object path
    ///
    /// Splits the hash as `XX/YYYYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        self.to_hex()[..7].to_string()
    }
}

impl FromStr for ObjectId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn hello_blob_address_matches_git() {
        // printf 'hello' | git hash-object --stdin
        let oid = ObjectId::for_object(ObjectType::Blob, b"hello");
        pretty_assertions::assert_eq!(oid.to_hex(), "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0");
        pretty_assertions::assert_eq!(oid, ObjectId::digest(b"blob 5\0hello"));
    }

    #[test]
    fn path_splits_into_shard_and_suffix() {
        let oid = ObjectId::try_parse("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0").unwrap();
        pretty_assertions::assert_eq!(
            oid.to_path(),
            PathBuf::from("b6").join("fc4c620b67d95f953a5c1c1230aaab5db5a1b0")
        );
        pretty_assertions::assert_eq!(oid.to_short_oid(), "b6fc4c6");
    }

    #[test]
    fn binary_form_round_trips() {
        let oid = ObjectId::digest(b"anything");
        let mut buffer = Vec::new();
        oid.write_h40_to(&mut buffer).unwrap();

        pretty_assertions::assert_eq!(buffer.len(), OBJECT_ID_BYTES);
        let parsed = ObjectId::read_h40_from(&mut buffer.as_slice()).unwrap();
        pretty_assertions::assert_eq!(parsed, oid);
    }

    #[rstest]
    #[case("")]
    #[case("b6fc4c6")]
    #[case("z6fc4c620b67d95f953a5c1c1230aaab5db5a1b0")]
    #[case("b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0ff")]
    fn invalid_hex_is_rejected(#[case] input: &str) {
        let error = ObjectId::try_parse(input).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Format(_))
        ));
    }
}
