//! Git delta format
//!
//! A delta starts with the source and target sizes (base-128 varints) and is
//! followed by instructions:
//!
//! - copy (`1xxxxxxx`): the low 4 bits select offset bytes, the next 3 bits
//!   select size bytes, both little-endian; a size of 0 means `0x10000`
//! - insert (`0xxxxxxx`, 1..=127): that many literal bytes follow
//! - `0x00` is reserved

use crate::artifacts::core::error::GitError;
use crate::artifacts::pack::entry::{read_size_varint, write_size_varint};
use bytes::Bytes;

/// Largest copy a single instruction can express without size bytes
const MAX_COPY_CHUNK: usize = 0x10000;

/// Largest literal run a single insert instruction carries
const MAX_INSERT_CHUNK: usize = 0x7f;

/// Declared source and target sizes
pub fn delta_sizes(delta: &[u8]) -> anyhow::Result<(usize, usize)> {
    let mut position = 0;
    let source_size = read_size_varint(delta, &mut position)? as usize;
    let target_size = read_size_varint(delta, &mut position)? as usize;
    Ok((source_size, target_size))
}

/// Rebuild a target from its base and a delta
pub fn apply_delta(base: &[u8], delta: &[u8]) -> anyhow::Result<Bytes> {
    let mut position = 0;
    let source_size = read_size_varint(delta, &mut position)? as usize;
    let target_size = read_size_varint(delta, &mut position)? as usize;

    if source_size != base.len() {
        anyhow::bail!(GitError::format(format!(
            "delta expects a {source_size}-byte base, got {} bytes",
            base.len()
        )));
    }

    let mut target = Vec::with_capacity(target_size.min(base.len().saturating_add(delta.len())));
    while position < delta.len() {
        let opcode = delta[position];
        position += 1;

        if opcode & 0x80 != 0 {
            let (offset, size) = decode_copy(delta, &mut position, opcode)?;
            let end = offset
                .checked_add(size)
                .filter(|end| *end <= base.len())
                .ok_or_else(|| {
                    GitError::format(format!(
                        "delta copies {size} bytes at {offset}, past the {}-byte base",
                        base.len()
                    ))
                })?;
            if target.len() + size > target_size {
                anyhow::bail!(GitError::format("delta output exceeds the declared size"));
            }
            target.extend_from_slice(&base[offset..end]);
        } else if opcode != 0 {
            let size = opcode as usize;
            let literal = delta
                .get(position..position + size)
                .ok_or_else(|| GitError::format("delta insert runs past the end"))?;
            if target.len() + size > target_size {
                anyhow::bail!(GitError::format("delta output exceeds the declared size"));
            }
            target.extend_from_slice(literal);
            position += size;
        } else {
            anyhow::bail!(GitError::format("reserved delta opcode 0"));
        }
    }

    if target.len() != target_size {
        anyhow::bail!(GitError::format(format!(
            "delta produced {} bytes, declared {target_size}",
            target.len()
        )));
    }

    Ok(Bytes::from(target))
}

fn decode_copy(delta: &[u8], position: &mut usize, opcode: u8) -> anyhow::Result<(usize, usize)> {
    let mut next = |present: bool, shift: u32| -> anyhow::Result<usize> {
        if !present {
            return Ok(0);
        }
        let byte = delta
            .get(*position)
            .copied()
            .ok_or_else(|| GitError::format("delta copy instruction is truncated"))?;
        *position += 1;
        Ok((byte as usize) << shift)
    };

    let mut offset = 0;
    for bit in 0..4 {
        offset |= next(opcode & (1 << bit) != 0, bit * 8)?;
    }

    let mut size = 0;
    for bit in 0..3 {
        size |= next(opcode & (0x10 << bit) != 0, bit * 8)?;
    }

    if size == 0 {
        size = MAX_COPY_CHUNK;
    }

    Ok((offset, size))
}

fn encode_copy(out: &mut Vec<u8>, offset: usize, size: usize) {
    let opcode_position = out.len();
    let mut opcode = 0x80u8;
    out.push(opcode);

    for bit in 0..4 {
        let byte = (offset >> (bit * 8)) as u8;
        if byte != 0 {
            opcode |= 1 << bit;
            out.push(byte);
        }
    }

    // a copy of exactly 0x10000 bytes is written with no size bytes
    if size != MAX_COPY_CHUNK {
        for bit in 0..3 {
            let byte = (size >> (bit * 8)) as u8;
            if byte != 0 {
                opcode |= 0x10 << bit;
                out.push(byte);
            }
        }
    }

    out[opcode_position] = opcode;
}

fn encode_copies(out: &mut Vec<u8>, mut offset: usize, mut size: usize) {
    while size > 0 {
        let chunk = size.min(MAX_COPY_CHUNK);
        encode_copy(out, offset, chunk);
        offset += chunk;
        size -= chunk;
    }
}

fn encode_inserts(out: &mut Vec<u8>, literal: &[u8]) {
    for chunk in literal.chunks(MAX_INSERT_CHUNK) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
}

/// Encode `target` against `base`, reusing their common prefix and suffix
pub fn encode(base: &[u8], target: &[u8]) -> Vec<u8> {
    let prefix = base
        .iter()
        .zip(target)
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = base[prefix..]
        .iter()
        .rev()
        .zip(target[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = Vec::new();
    write_size_varint(&mut out, base.len() as u64);
    write_size_varint(&mut out, target.len() as u64);

    encode_copies(&mut out, 0, prefix);
    encode_inserts(&mut out, &target[prefix..target.len() - suffix]);
    encode_copies(&mut out, base.len() - suffix, suffix);

    out
}
