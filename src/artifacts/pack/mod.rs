//! Packfiles
//!
//! A pack bundles many objects in one file, some of them stored as deltas
//! against other objects of the same pack.
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "PACK" (4 bytes)
//!   - Version: 2 or 3 (4 bytes, big-endian)
//!   - Entry count (4 bytes, big-endian)
//!
//! Entries (variable length):
//!   - Type (3 bits) and inflated size (base-128, little-endian groups)
//!   - ofs-delta: backward distance to the base entry
//!   - ref-delta: 20-byte address of the base object
//!   - zlib-compressed payload
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```
//!
//! - `entry`: entry header and offset encodings
//! - `delta`: delta instruction decoding and encoding
//! - `base_cache`: bounded cache of resolved delta bases
//! - `pack_index`: the `.idx` v2 companion file
//! - `pack_file`: decoding and delta resolution
//! - `pack_writer`: pack generation

pub mod base_cache;
pub mod delta;
pub mod entry;
pub mod pack_file;
pub mod pack_index;
pub mod pack_writer;

/// Magic signature identifying pack files
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// Size of the pack header in bytes
pub const PACK_HEADER_SIZE: usize = 12;

/// Version written by `PackWriter`
pub const PACK_VERSION: u32 = 2;

/// Size of the trailing SHA-1 checksum
pub const PACK_CHECKSUM_SIZE: usize = 20;

pub const OBJ_OFS_DELTA: u8 = 6;
pub const OBJ_REF_DELTA: u8 = 7;
