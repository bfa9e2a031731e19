//! SHA-1 trailer handling for checksummed files (index, pack index)
//!
//! Everything read or written through a `Checksum` is fed to a running digest,
//! which is then compared against (or appended as) the trailing 20 bytes.

use crate::artifacts::core::error::GitError;
use crate::artifacts::index::CHECKSUM_SIZE;
use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

#[derive(Debug)]
pub struct Checksum<S> {
    stream: S,
    digest: Sha1,
}

impl<S> Checksum<S> {
    pub fn new(stream: S) -> Self {
        Checksum {
            stream,
            digest: Sha1::new(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> Checksum<S> {
    pub fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0; size];
        self.stream
            .read_exact(&mut buffer)
            .map_err(|_| GitError::format("unexpected end of file before checksum"))?;

        self.digest.update(&buffer);
        Ok(Bytes::from(buffer))
    }

    /// Read the stored trailer and compare it with everything read so far
    pub fn verify(&mut self) -> anyhow::Result<()> {
        let mut expected = [0u8; CHECKSUM_SIZE];
        self.stream
            .read_exact(&mut expected)
            .map_err(|_| GitError::format("missing trailing checksum"))?;

        let actual = self.digest.clone().finalize();
        if expected != actual.as_slice() {
            anyhow::bail!(GitError::integrity(
                &ObjectId::from_bytes(&expected)?,
                &ObjectId::from_bytes(actual.as_slice())?
            ));
        }

        Ok(())
    }
}

impl<S: Write> Checksum<S> {
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.stream.write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    /// Append the digest of everything written so far
    pub fn write_checksum(&mut self) -> anyhow::Result<ObjectId> {
        let checksum = self.digest.clone().finalize();
        self.stream.write_all(checksum.as_slice())?;

        ObjectId::from_bytes(checksum.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn written_trailer_verifies() {
        let mut writer = Checksum::new(Vec::new());
        writer.write(b"DIRC").unwrap();
        writer.write(b"payload").unwrap();
        writer.write_checksum().unwrap();
        let bytes = writer.into_inner();

        let mut reader = Checksum::new(Cursor::new(&bytes[..]));
        reader.read(4).unwrap();
        reader.read(7).unwrap();
        reader.verify().unwrap();
    }

    #[test]
    fn corrupted_payload_is_an_integrity_error() {
        let mut writer = Checksum::new(Vec::new());
        writer.write(b"payload").unwrap();
        writer.write_checksum().unwrap();
        let mut bytes = writer.into_inner();
        bytes[0] ^= 0xff;

        let mut reader = Checksum::new(Cursor::new(&bytes[..]));
        reader.read(7).unwrap();
        let error = reader.verify().unwrap_err();

        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Integrity { .. })
        ));
    }
}
