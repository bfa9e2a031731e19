//! Pack entry headers
//!
//! The first byte of an entry holds a continuation bit, the 3-bit type and the
//! low 4 bits of the inflated size; further bytes add 7 size bits each.

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::OBJECT_ID_BYTES;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::{OBJ_OFS_DELTA, OBJ_REF_DELTA};

/// Longest ofs-delta distance encoding accepted (covers 64-bit offsets)
const MAX_OFS_BYTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryKind {
    Base(ObjectType),
    OfsDelta { base_offset: u64 },
    RefDelta { base: ObjectId },
}

impl PackEntryKind {
    pub fn is_delta(&self) -> bool {
        !matches!(self, PackEntryKind::Base(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: PackEntryKind,
    /// Inflated size of the payload (the delta itself for delta entries)
    pub size: u64,
    /// Position of the compressed payload
    pub data_start: usize,
}

fn byte_at(data: &[u8], position: usize) -> anyhow::Result<u8> {
    data.get(position)
        .copied()
        .ok_or_else(|| GitError::format("pack entry header is truncated").into())
}

/// Parse the header of the entry starting at `offset`
///
/// `data` must exclude the pack trailer.
pub fn read_entry_header(data: &[u8], offset: u64) -> anyhow::Result<EntryHeader> {
    let start = usize::try_from(offset)
        .map_err(|_| GitError::format(format!("pack offset {offset} out of range")))?;
    let mut position = start;

    let mut byte = byte_at(data, position)?;
    position += 1;

    let type_code = (byte >> 4) & 0x07;
    let mut size = (byte & 0x0f) as u64;
    let mut shift = 4u32;

    while byte & 0x80 != 0 {
        if shift >= 64 {
            anyhow::bail!(GitError::format(format!(
                "size of pack entry at {offset} overflows"
            )));
        }
        byte = byte_at(data, position)?;
        position += 1;
        size |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    let kind = match type_code {
        1 => PackEntryKind::Base(ObjectType::Commit),
        2 => PackEntryKind::Base(ObjectType::Tree),
        3 => PackEntryKind::Base(ObjectType::Blob),
        4 => PackEntryKind::Base(ObjectType::Tag),
        OBJ_OFS_DELTA => {
            let (distance, consumed) = read_ofs_distance(&data[position.min(data.len())..])?;
            position += consumed;
            if distance == 0 || distance > offset {
                anyhow::bail!(GitError::format(format!(
                    "ofs-delta at {offset} points {distance} bytes back, outside the pack"
                )));
            }
            PackEntryKind::OfsDelta {
                base_offset: offset - distance,
            }
        }
        OBJ_REF_DELTA => {
            let end = position + OBJECT_ID_BYTES;
            if end > data.len() {
                anyhow::bail!(GitError::format("ref-delta base address is truncated"));
            }
            let base = ObjectId::from_bytes(&data[position..end])?;
            position = end;
            PackEntryKind::RefDelta { base }
        }
        other => anyhow::bail!(GitError::format(format!(
            "invalid pack entry type {other} at offset {offset}"
        ))),
    };

    Ok(EntryHeader {
        kind,
        size,
        data_start: position,
    })
}

pub fn write_entry_header(out: &mut Vec<u8>, type_code: u8, size: u64) {
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    let mut rest = size >> 4;

    while rest != 0 {
        out.push(byte | 0x80);
        byte = (rest & 0x7f) as u8;
        rest >>= 7;
    }
    out.push(byte);
}

/// Decode an ofs-delta distance: big-endian groups, adding one per continuation
pub fn read_ofs_distance(data: &[u8]) -> anyhow::Result<(u64, usize)> {
    let mut position = 0;
    let mut byte = byte_at(data, position)?;
    position += 1;
    let mut value = (byte & 0x7f) as u64;

    while byte & 0x80 != 0 {
        if position >= MAX_OFS_BYTES {
            anyhow::bail!(GitError::format("ofs-delta distance is too long"));
        }
        byte = byte_at(data, position)?;
        position += 1;
        value = ((value + 1) << 7) | (byte & 0x7f) as u64;
    }

    Ok((value, position))
}

pub fn write_ofs_distance(out: &mut Vec<u8>, distance: u64) {
    let mut buffer = [0u8; MAX_OFS_BYTES];
    let mut position = buffer.len() - 1;
    let mut value = distance;

    buffer[position] = (value & 0x7f) as u8;
    value >>= 7;
    while value != 0 {
        value -= 1;
        position -= 1;
        buffer[position] = 0x80 | (value & 0x7f) as u8;
        value >>= 7;
    }

    out.extend_from_slice(&buffer[position..]);
}

/// Delta size varint: base-128, little-endian groups
pub fn read_size_varint(data: &[u8], position: &mut usize) -> anyhow::Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = data
            .get(*position)
            .copied()
            .ok_or_else(|| GitError::format("delta size is truncated"))?;
        *position += 1;

        if shift > 63 {
            anyhow::bail!(GitError::format("delta size overflows"));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

pub fn write_size_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, &[0x00])]
    #[case(127, &[0x7f])]
    #[case(128, &[0x80, 0x00])]
    #[case(16511, &[0xff, 0x7f])]
    #[case(16512, &[0x80, 0x80, 0x00])]
    fn ofs_distance_uses_the_plus_one_rule(#[case] distance: u64, #[case] encoded: &[u8]) {
        let mut out = Vec::new();
        write_ofs_distance(&mut out, distance);

        pretty_assertions::assert_eq!(out, encoded);
        pretty_assertions::assert_eq!(read_ofs_distance(encoded).unwrap(), (distance, encoded.len()));
    }

    #[test]
    fn blob_header_with_multi_byte_size() {
        let mut data = Vec::new();
        write_entry_header(&mut data, 3, 300);
        data.extend_from_slice(b"payload");

        let header = read_entry_header(&data, 0).unwrap();
        pretty_assertions::assert_eq!(header.kind, PackEntryKind::Base(ObjectType::Blob));
        pretty_assertions::assert_eq!(header.size, 300);
        pretty_assertions::assert_eq!(header.data_start, 2);
    }

    #[test]
    fn ofs_delta_pointing_past_the_start_is_rejected() {
        let mut data = vec![0u8; 4];
        write_entry_header(&mut data, OBJ_OFS_DELTA, 10);
        write_ofs_distance(&mut data, 100);

        let error = read_entry_header(&data, 4).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<GitError>(),
            Some(GitError::Format(_))
        ));
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    fn reserved_types_are_rejected(#[case] type_code: u8) {
        let mut data = Vec::new();
        write_entry_header(&mut data, type_code, 1);

        assert!(read_entry_header(&data, 0).is_err());
    }

    proptest! {
        #[test]
        fn ofs_distances_decode_to_what_was_encoded(distance in 0u64..(1 << 56)) {
            let mut out = Vec::new();
            write_ofs_distance(&mut out, distance);
            prop_assert_eq!(read_ofs_distance(&out).unwrap(), (distance, out.len()));
        }

        #[test]
        fn entry_sizes_decode_to_what_was_encoded(size in 0u64..(1 << 60), type_code in 1u8..=4) {
            let mut out = Vec::new();
            write_entry_header(&mut out, type_code, size);
            let header = read_entry_header(&out, 0).unwrap();
            prop_assert_eq!(header.size, size);
            prop_assert_eq!(header.data_start, out.len());
        }
    }
}
