//! zlib compression used by loose objects and pack entries

use crate::artifacts::core::error::GitError;
use anyhow::Context;
use bytes::Bytes;
use std::io::{Read, Write};

pub fn compress(data: &[u8], level: u32) -> anyhow::Result<Bytes> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder
        .write_all(data)
        .context("Unable to compress object content")?;

    encoder
        .finish()
        .map(Bytes::from)
        .context("Unable to finish compressing object content")
}

pub fn decompress(data: &[u8]) -> anyhow::Result<Bytes> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut decompressed_content = Vec::new();
    decoder
        .read_to_end(&mut decompressed_content)
        .map_err(|e| GitError::format(format!("corrupt zlib stream: {e}")))?;

    Ok(decompressed_content.into())
}

/// Inflate a zlib stream that is followed by unrelated bytes
///
/// Returns the inflated content and the number of compressed bytes consumed,
/// which is how pack entries find where the next entry starts. Inflating stops
/// one byte past `expected_size`, so a stream longer than declared is a format
/// error and a huge declared size allocates nothing up front.
pub fn inflate_prefix(data: &[u8], expected_size: u64) -> anyhow::Result<(Bytes, usize)> {
    let mut decoder = flate2::bufread::ZlibDecoder::new(data);
    let mut inflated = Vec::with_capacity(initial_capacity(expected_size, data.len()));
    (&mut decoder)
        .take(expected_size.saturating_add(1))
        .read_to_end(&mut inflated)
        .map_err(|e| GitError::format(format!("corrupt zlib stream: {e}")))?;

    if inflated.len() as u64 != expected_size {
        anyhow::bail!(GitError::format(format!(
            "zlib stream declares {expected_size} bytes but inflates to {}{}",
            inflated.len(),
            if inflated.len() as u64 > expected_size { " or more" } else { "" }
        )));
    }

    Ok((inflated.into(), decoder.total_in() as usize))
}

/// Reservation for an output whose size comes from untrusted input
///
/// zlib rarely expands past a few times its input, so that bounds the guess.
pub fn initial_capacity(declared: u64, input_len: usize) -> usize {
    usize::try_from(declared)
        .unwrap_or(usize::MAX)
        .min(input_len.saturating_mul(4))
}
