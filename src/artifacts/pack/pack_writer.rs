use crate::artifacts::core::compression;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::delta;
use crate::artifacts::pack::entry::{write_entry_header, write_ofs_distance};
use crate::artifacts::pack::pack_index::{PackIndex, PackIndexEntry};
use crate::artifacts::pack::{OBJ_OFS_DELTA, OBJ_REF_DELTA, PACK_SIGNATURE, PACK_VERSION};
use byteorder::ByteOrder;
use bytes::Bytes;

/// Builds a version 2 pack in memory
///
/// The entry count in the header is patched in by [`PackWriter::finish`].
#[derive(Debug)]
pub struct PackWriter {
    buffer: Vec<u8>,
    entries: Vec<PackIndexEntry>,
    compression_level: u32,
}

impl PackWriter {
    pub fn new(compression_level: u32) -> Self {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(PACK_SIGNATURE);
        buffer.extend_from_slice(&PACK_VERSION.to_be_bytes());
        buffer.extend_from_slice(&0u32.to_be_bytes());

        PackWriter {
            buffer,
            entries: Vec::new(),
            compression_level,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a full object, returning its offset
    pub fn write_object(&mut self, object: &RawObject) -> anyhow::Result<u64> {
        let offset = self.buffer.len() as u64;

        let mut header = Vec::new();
        write_entry_header(&mut header, object.object_type.pack_code(), object.size() as u64);
        self.append(object.oid(), offset, header, &object.data)?;

        Ok(offset)
    }

    /// Append `target` as a delta against the entry already written at `base_offset`
    pub fn write_ofs_delta(
        &mut self,
        target: &RawObject,
        base_offset: u64,
        base: &RawObject,
    ) -> anyhow::Result<u64> {
        let offset = self.buffer.len() as u64;
        if base_offset >= offset {
            anyhow::bail!("ofs-delta base at {base_offset} must precede the entry at {offset}");
        }

        let delta = delta::encode(&base.data, &target.data);
        let mut header = Vec::new();
        write_entry_header(&mut header, OBJ_OFS_DELTA, delta.len() as u64);
        write_ofs_distance(&mut header, offset - base_offset);
        self.append(target.oid(), offset, header, &delta)?;

        Ok(offset)
    }

    /// Append `target` as a delta against `base`, named by address
    pub fn write_ref_delta(&mut self, target: &RawObject, base: &RawObject) -> anyhow::Result<u64> {
        let offset = self.buffer.len() as u64;

        let delta = delta::encode(&base.data, &target.data);
        let mut header = Vec::new();
        write_entry_header(&mut header, OBJ_REF_DELTA, delta.len() as u64);
        header.extend_from_slice(base.oid().as_bytes());
        self.append(target.oid(), offset, header, &delta)?;

        Ok(offset)
    }

    /// Seal the pack: patch the count and append the trailer
    pub fn finish(mut self) -> anyhow::Result<(Bytes, PackIndex)> {
        let count = u32::try_from(self.entries.len())?;
        byteorder::NetworkEndian::write_u32(&mut self.buffer[8..12], count);

        let checksum = ObjectId::digest(&self.buffer);
        self.buffer.extend_from_slice(checksum.as_bytes());

        Ok((
            Bytes::from(self.buffer),
            PackIndex::new(self.entries, checksum),
        ))
    }

    fn append(
        &mut self,
        oid: ObjectId,
        offset: u64,
        mut entry: Vec<u8>,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        entry.extend_from_slice(&compression::compress(payload, self.compression_level)?);

        let mut crc = flate2::Crc::new();
        crc.update(&entry);

        self.buffer.extend_from_slice(&entry);
        self.entries.push(PackIndexEntry::new(oid, offset, crc.sum()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object_type::ObjectType;

    #[test]
    fn empty_pack_is_header_and_trailer() {
        let (bytes, index) = PackWriter::new(6).finish().unwrap();

        pretty_assertions::assert_eq!(bytes.len(), 12 + 20);
        pretty_assertions::assert_eq!(&bytes[0..4], b"PACK");
        assert!(index.is_empty());
        pretty_assertions::assert_eq!(
            index.pack_checksum(),
            &ObjectId::digest(&bytes[..12])
        );
    }

    #[test]
    fn offsets_and_count_are_recorded() {
        let mut writer = PackWriter::new(6);
        let first = writer
            .write_object(&RawObject::new(ObjectType::Blob, Bytes::from_static(b"one")))
            .unwrap();
        let second = writer
            .write_object(&RawObject::new(ObjectType::Blob, Bytes::from_static(b"two")))
            .unwrap();
        let (bytes, index) = writer.finish().unwrap();

        pretty_assertions::assert_eq!(first, 12);
        assert!(second > first);
        pretty_assertions::assert_eq!(byteorder::NetworkEndian::read_u32(&bytes[8..12]), 2);
        pretty_assertions::assert_eq!(index.len(), 2);
    }

    #[test]
    fn ofs_delta_base_must_precede() {
        let object = RawObject::new(ObjectType::Blob, Bytes::from_static(b"x"));
        let mut writer = PackWriter::new(6);

        assert!(writer.write_ofs_delta(&object, 100, &object).is_err());
    }
}
