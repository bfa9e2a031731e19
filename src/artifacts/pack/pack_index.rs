//! Pack index (`.idx`) version 2
//!
//! ```text
//! Header: "\xfftOc", version 2
//! Fanout: 256 big-endian counts of addresses whose first byte is <= i
//! Addresses: sorted, 20 bytes each
//! CRC32 of each packed entry
//! Offsets: 31-bit, or MSB set + index into the 64-bit table
//! 64-bit offsets
//! Pack checksum, index checksum
//! ```

use crate::artifacts::core::error::GitError;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::pack::PACK_CHECKSUM_SIZE;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::Cursor;

const IDX_SIGNATURE: &[u8; 4] = b"\xfftOc";
const IDX_VERSION: u32 = 2;
const FANOUT_SIZE: usize = 256 * 4;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct PackIndexEntry {
    pub oid: ObjectId,
    pub offset: u64,
    pub crc32: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackIndex {
    /// Sorted by address
    entries: Vec<PackIndexEntry>,
    pack_checksum: ObjectId,
}

impl PackIndex {
    pub fn new(mut entries: Vec<PackIndexEntry>, pack_checksum: ObjectId) -> Self {
        entries.sort_by(|a, b| a.oid.cmp(&b.oid));
        PackIndex {
            entries,
            pack_checksum,
        }
    }

    pub fn entries(&self) -> &[PackIndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pack_checksum(&self) -> &ObjectId {
        &self.pack_checksum
    }

    pub fn lookup(&self, oid: &ObjectId) -> Option<&PackIndexEntry> {
        self.entries
            .binary_search_by(|entry| entry.oid.cmp(oid))
            .ok()
            .map(|position| &self.entries[position])
    }

    pub fn offset_of(&self, oid: &ObjectId) -> Option<u64> {
        self.lookup(oid).map(|entry| entry.offset)
    }

    /// Entries in pack order with the number of bytes each occupies
    ///
    /// `data_end` is where the pack trailer starts.
    pub fn spans(&self, data_end: u64) -> Vec<(PackIndexEntry, u64)> {
        let mut by_offset = self.entries.clone();
        by_offset.sort_by_key(|entry| entry.offset);

        let ends = by_offset
            .iter()
            .skip(1)
            .map(|entry| entry.offset)
            .chain(std::iter::once(data_end))
            .collect::<Vec<_>>();

        by_offset
            .into_iter()
            .zip(ends)
            .map(|(entry, end)| (entry, end.saturating_sub(entry.offset)))
            .collect()
    }

    pub fn parse(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Checksum::new(Cursor::new(data));

        let header = reader.read(8)?;
        if &header[0..4] != IDX_SIGNATURE {
            anyhow::bail!(GitError::format("pack index signature is missing"));
        }
        let version = byteorder::NetworkEndian::read_u32(&header[4..8]);
        if version != IDX_VERSION {
            anyhow::bail!(GitError::format(format!(
                "unsupported pack index version {version}"
            )));
        }

        let fanout = reader.read(FANOUT_SIZE)?;
        let mut previous = 0;
        for bucket in fanout.chunks_exact(4) {
            let count = byteorder::NetworkEndian::read_u32(bucket);
            if count < previous {
                anyhow::bail!(GitError::format("pack index fanout is not monotonic"));
            }
            previous = count;
        }
        let count = previous as usize;
        if count.saturating_mul(OBJECT_ID_BYTES + 8) > data.len() {
            anyhow::bail!(GitError::format(format!(
                "pack index claims {count} objects but is only {} bytes",
                data.len()
            )));
        }

        let oids = reader.read(count * OBJECT_ID_BYTES)?;
        let crcs = reader.read(count * 4)?;
        let small_offsets = reader.read(count * 4)?;
        let large_count = small_offsets
            .chunks_exact(4)
            .filter(|chunk| byteorder::NetworkEndian::read_u32(chunk) & LARGE_OFFSET_FLAG != 0)
            .count();
        let large_offsets = reader.read(large_count * 8)?;
        let pack_checksum = ObjectId::from_bytes(&reader.read(PACK_CHECKSUM_SIZE)?)?;
        reader.verify()?;

        let mut entries = Vec::with_capacity(count);
        for position in 0..count {
            let oid = ObjectId::from_bytes(
                &oids[position * OBJECT_ID_BYTES..(position + 1) * OBJECT_ID_BYTES],
            )?;
            if let Some(previous) = entries.last().map(|entry: &PackIndexEntry| entry.oid)
                && previous >= oid
            {
                anyhow::bail!(GitError::format("pack index addresses are not sorted"));
            }

            let crc32 = byteorder::NetworkEndian::read_u32(&crcs[position * 4..]);
            let small = byteorder::NetworkEndian::read_u32(&small_offsets[position * 4..]);
            let offset = if small & LARGE_OFFSET_FLAG == 0 {
                small as u64
            } else {
                let slot = (small & !LARGE_OFFSET_FLAG) as usize;
                if slot >= large_count {
                    anyhow::bail!(GitError::format("pack index 64-bit offset out of range"));
                }
                byteorder::NetworkEndian::read_u64(&large_offsets[slot * 8..])
            };

            entries.push(PackIndexEntry::new(oid, offset, crc32));
        }

        if reader.into_inner().position() as usize != data.len() {
            anyhow::bail!(GitError::format("trailing bytes after pack index"));
        }

        Ok(PackIndex {
            entries,
            pack_checksum,
        })
    }

    pub fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut writer = Checksum::new(Vec::new());

        let mut header = Vec::with_capacity(8);
        header.extend_from_slice(IDX_SIGNATURE);
        header.write_u32::<byteorder::NetworkEndian>(IDX_VERSION)?;
        writer.write(&header)?;

        let mut fanout = [0u32; 256];
        for entry in &self.entries {
            fanout[entry.oid.as_bytes()[0] as usize] += 1;
        }
        let mut running = 0;
        let mut fanout_bytes = Vec::with_capacity(FANOUT_SIZE);
        for bucket in fanout {
            running += bucket;
            fanout_bytes.write_u32::<byteorder::NetworkEndian>(running)?;
        }
        writer.write(&fanout_bytes)?;

        for entry in &self.entries {
            writer.write(entry.oid.as_bytes())?;
        }

        let mut crcs = Vec::with_capacity(self.entries.len() * 4);
        for entry in &self.entries {
            crcs.write_u32::<byteorder::NetworkEndian>(entry.crc32)?;
        }
        writer.write(&crcs)?;

        let mut small_offsets = Vec::with_capacity(self.entries.len() * 4);
        let mut large_offsets = Vec::new();
        for entry in &self.entries {
            if entry.offset < LARGE_OFFSET_FLAG as u64 {
                small_offsets.write_u32::<byteorder::NetworkEndian>(entry.offset as u32)?;
            } else {
                let slot = (large_offsets.len() / 8) as u32;
                small_offsets.write_u32::<byteorder::NetworkEndian>(slot | LARGE_OFFSET_FLAG)?;
                large_offsets.write_u64::<byteorder::NetworkEndian>(entry.offset)?;
            }
        }
        writer.write(&small_offsets)?;
        writer.write(&large_offsets)?;

        writer.write(self.pack_checksum.as_bytes())?;
        writer.write_checksum()?;

        Ok(Bytes::from(writer.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn index() -> PackIndex {
        PackIndex::new(
            vec![
                PackIndexEntry::new(ObjectId::digest(b"two"), 200, 0xdead_beef),
                PackIndexEntry::new(ObjectId::digest(b"one"), 12, 0x1234_5678),
                PackIndexEntry::new(ObjectId::digest(b"far"), 1 << 33, 7),
            ],
            ObjectId::digest(b"pack"),
        )
    }

    #[rstest]
    fn serialized_index_parses_back(index: PackIndex) {
        let bytes = index.serialize().unwrap();
        let parsed = PackIndex::parse(&bytes).unwrap();

        pretty_assertions::assert_eq!(parsed, index);
        pretty_assertions::assert_eq!(
            parsed.offset_of(&ObjectId::digest(b"far")),
            Some(1 << 33)
        );
        assert!(parsed.lookup(&ObjectId::digest(b"missing")).is_none());
    }

    #[rstest]
    fn flipped_byte_fails_the_checksum(index: PackIndex) {
        let mut bytes = index.serialize().unwrap().to_vec();
        let middle = bytes.len() / 2;
        bytes[middle] ^= 0x01;

        assert!(PackIndex::parse(&bytes).is_err());
    }

    #[rstest]
    fn spans_follow_pack_order(index: PackIndex) {
        let spans = index.spans((1 << 33) + 50);
        let lengths = spans
            .iter()
            .map(|(entry, length)| (entry.offset, *length))
            .collect::<Vec<_>>();

        pretty_assertions::assert_eq!(
            lengths,
            vec![(12, 188), (200, (1 << 33) - 200), (1 << 33, 50)]
        );
    }
}
