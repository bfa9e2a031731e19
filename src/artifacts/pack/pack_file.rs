//! Pack decoding and delta resolution
//!
//! A [`PackFile`] owns the pack bytes and an address → offset map, taken from
//! an accompanying `.idx` or derived by walking the pack once. Objects are
//! materialized on demand by following delta chains iteratively: the chain is
//! pushed on an explicit stack down to a base (or a cached intermediate), then
//! the deltas are applied back up. Resolved bases are cached by offset in a
//! byte-bounded LRU shared between threads; full sweeps (`verify`, `objects`)
//! empty it when they finish.

use crate::artifacts::core::compression;
use crate::artifacts::core::config::StoreConfig;
use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::base_cache::BaseCache;
use crate::artifacts::pack::delta::apply_delta;
use crate::artifacts::pack::entry::{EntryHeader, PackEntryKind, read_entry_header};
use crate::artifacts::pack::pack_index::{PackIndex, PackIndexEntry};
use crate::artifacts::pack::{PACK_CHECKSUM_SIZE, PACK_HEADER_SIZE, PACK_SIGNATURE};
use byteorder::ByteOrder;
use bytes::Bytes;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of resolving one entry
#[derive(Debug)]
enum Resolution {
    Resolved(RawObject),
    /// A ref-delta in the chain names a base this pack does not (yet) know
    MissingBase(ObjectId),
}

/// What `verify-pack -v` reports per entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntryInfo {
    pub oid: ObjectId,
    pub object_type: ObjectType,
    pub size: usize,
    pub packed_size: u64,
    pub offset: u64,
    /// Number of deltas between this entry and its full base
    pub depth: usize,
    pub base: Option<ObjectId>,
}

#[derive(Debug)]
pub struct PackFile {
    data: Bytes,
    version: u32,
    checksum: ObjectId,
    index: PackIndex,
    offsets: HashMap<ObjectId, u64>,
    /// Resolved bases by offset, with their delta depth
    cache: Mutex<BaseCache>,
    max_delta_depth: usize,
}

impl PackFile {
    /// Decode a pack without an index, deriving one in a streaming pass
    ///
    /// Ref-deltas whose base appears later in the pack are deferred and
    /// retried until a pass makes no progress.
    pub fn parse(data: Bytes, config: &StoreConfig) -> anyhow::Result<Self> {
        let (version, count, checksum) = Self::check_header(&data)?;
        let mut pack = PackFile {
            data,
            version,
            checksum,
            index: PackIndex::new(Vec::new(), checksum),
            offsets: HashMap::new(),
            cache: Mutex::new(BaseCache::new(config.delta_cache_bytes)),
            max_delta_depth: config.max_delta_depth,
        };

        let mut pending = pack.scan_entries(count)?;
        let mut resolved: Vec<PackIndexEntry> = Vec::with_capacity(pending.len());
        let mut passes = 0;

        loop {
            passes += 1;
            let before = resolved.len();
            let mut deferred = Vec::new();

            for (offset, crc32) in pending {
                match pack.resolve(offset)? {
                    Resolution::Resolved(object) => {
                        let oid = object.oid();
                        if pack.offsets.insert(oid, offset).is_none() {
                            resolved.push(PackIndexEntry::new(oid, offset, crc32));
                        }
                    }
                    Resolution::MissingBase(base) => deferred.push((offset, crc32, base)),
                }
            }

            if deferred.is_empty() {
                break;
            }
            if resolved.len() == before {
                let (offset, _, base) = deferred[0];
                warn!(%base, offset, "ref-delta base is not in the pack");
                anyhow::bail!(GitError::not_found(format!(
                    "delta base {base} for pack entry at offset {offset}"
                )));
            }
            pending = deferred
                .into_iter()
                .map(|(offset, crc32, _)| (offset, crc32))
                .collect();
        }

        pack.index = PackIndex::new(resolved, checksum);
        pack.clear_cache();
        debug!(version, objects = pack.index.len(), passes, "derived pack index");

        Ok(pack)
    }

    /// Decode a pack using its `.idx`
    pub fn with_index(data: Bytes, index: PackIndex, config: &StoreConfig) -> anyhow::Result<Self> {
        let (version, count, checksum) = Self::check_header(&data)?;

        if *index.pack_checksum() != checksum {
            anyhow::bail!(GitError::integrity(index.pack_checksum(), &checksum));
        }
        if index.len() > count as usize {
            anyhow::bail!(GitError::format(format!(
                "pack holds {count} entries but its index lists {}",
                index.len()
            )));
        }

        let data_end = (data.len() - PACK_CHECKSUM_SIZE) as u64;
        if let Some(entry) = index
            .entries()
            .iter()
            .find(|entry| entry.offset < PACK_HEADER_SIZE as u64 || entry.offset >= data_end)
        {
            anyhow::bail!(GitError::format(format!(
                "index places {} at offset {} outside the pack",
                entry.oid, entry.offset
            )));
        }

        let offsets = index
            .entries()
            .iter()
            .map(|entry| (entry.oid, entry.offset))
            .collect();
        debug!(version, objects = index.len(), "opened indexed pack");

        Ok(PackFile {
            data,
            version,
            checksum,
            index,
            offsets,
            cache: Mutex::new(BaseCache::new(config.delta_cache_bytes)),
            max_delta_depth: config.max_delta_depth,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// SHA-1 trailer of the pack, which also names it on disk
    pub fn checksum(&self) -> &ObjectId {
        &self.checksum
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.offsets.contains_key(oid)
    }

    /// Materialize and verify one object
    pub fn read(&self, oid: &ObjectId) -> anyhow::Result<RawObject> {
        let offset = *self
            .offsets
            .get(oid)
            .ok_or_else(|| GitError::not_found(format!("object {oid}")))?;

        self.read_verified(oid, offset)
    }

    /// Materialize every object, in parallel, verifying each address
    pub fn objects(&self) -> anyhow::Result<Vec<(ObjectId, RawObject)>> {
        let objects = self
            .index
            .entries()
            .par_iter()
            .map(|entry| -> anyhow::Result<(ObjectId, RawObject)> {
                Ok((entry.oid, self.read_verified(&entry.oid, entry.offset)?))
            })
            .collect();
        self.clear_cache();

        objects
    }

    /// Check every object address and every entry CRC
    pub fn verify(&self) -> anyhow::Result<()> {
        let data_end = self.data_end() as u64;

        let verified = self
            .index
            .spans(data_end)
            .par_iter()
            .try_for_each(|(entry, length)| {
                let start = entry.offset as usize;
                let mut crc = flate2::Crc::new();
                crc.update(&self.data[start..start + *length as usize]);
                if crc.sum() != entry.crc32 {
                    anyhow::bail!(GitError::Integrity {
                        expected: format!("crc32 {:08x}", entry.crc32),
                        actual: format!("crc32 {:08x}", crc.sum()),
                    });
                }
                self.read_verified(&entry.oid, entry.offset).map(|_| ())
            });
        self.clear_cache();

        verified
    }

    /// Bytes of resolved bases currently cached
    pub fn cached_bytes(&self) -> usize {
        self.cache.lock().map(|cache| cache.used()).unwrap_or(0)
    }

    /// Per-entry description in pack order
    pub fn describe(&self) -> anyhow::Result<Vec<PackEntryInfo>> {
        let by_offset = self
            .index
            .entries()
            .iter()
            .map(|entry| (entry.offset, entry.oid))
            .collect::<HashMap<_, _>>();

        self.index
            .spans(self.data_end() as u64)
            .into_iter()
            .map(|(entry, packed_size)| {
                let object = self.read_verified(&entry.oid, entry.offset)?;
                let header = read_entry_header(self.body(), entry.offset)?;
                let base = match header.kind {
                    PackEntryKind::Base(_) => None,
                    PackEntryKind::OfsDelta { base_offset } => by_offset.get(&base_offset).copied(),
                    PackEntryKind::RefDelta { base } => Some(base),
                };

                Ok(PackEntryInfo {
                    oid: entry.oid,
                    object_type: object.object_type,
                    size: object.size(),
                    packed_size,
                    offset: entry.offset,
                    depth: self.chain_depth(entry.offset)?,
                    base,
                })
            })
            .collect()
    }

    fn check_header(data: &[u8]) -> anyhow::Result<(u32, u32, ObjectId)> {
        if data.len() < PACK_HEADER_SIZE + PACK_CHECKSUM_SIZE {
            anyhow::bail!(GitError::format("pack is too short"));
        }
        if &data[0..4] != PACK_SIGNATURE {
            anyhow::bail!(GitError::format("pack signature is missing"));
        }

        let version = byteorder::NetworkEndian::read_u32(&data[4..8]);
        if version != 2 && version != 3 {
            anyhow::bail!(GitError::format(format!(
                "unsupported pack version {version}"
            )));
        }
        let count = byteorder::NetworkEndian::read_u32(&data[8..12]);

        let data_end = data.len() - PACK_CHECKSUM_SIZE;
        let expected = ObjectId::from_bytes(&data[data_end..])?;
        let actual = ObjectId::digest(&data[..data_end]);
        if expected != actual {
            warn!(%expected, %actual, "pack trailer mismatch");
            anyhow::bail!(GitError::integrity(&expected, &actual));
        }

        Ok((version, count, expected))
    }

    fn data_end(&self) -> usize {
        self.data.len() - PACK_CHECKSUM_SIZE
    }

    /// Pack bytes without the trailer
    fn body(&self) -> &[u8] {
        &self.data[..self.data_end()]
    }

    /// Walk all entries once, checking that each inflates to its declared size
    ///
    /// Returns each entry's offset with the CRC32 of its packed bytes.
    fn scan_entries(&self, count: u32) -> anyhow::Result<Vec<(u64, u32)>> {
        let body = self.body();
        let mut position = PACK_HEADER_SIZE;
        // the smallest entry is a one-byte header plus an empty zlib stream
        let mut entries = Vec::with_capacity((count as usize).min(body.len() / 9));

        for _ in 0..count {
            let header = read_entry_header(body, position as u64)?;
            let (_, consumed) = self.inflate(&header)?;
            let end = header.data_start + consumed;

            let mut crc = flate2::Crc::new();
            crc.update(&body[position..end]);
            entries.push((position as u64, crc.sum()));
            position = end;
        }

        if position != body.len() {
            anyhow::bail!(GitError::format(format!(
                "{} unexpected bytes after the last pack entry",
                body.len() - position
            )));
        }

        Ok(entries)
    }

    fn inflate(&self, header: &EntryHeader) -> anyhow::Result<(Bytes, usize)> {
        let body = self.body();
        if header.data_start > body.len() {
            anyhow::bail!(GitError::format("pack entry payload is truncated"));
        }

        compression::inflate_prefix(&body[header.data_start..], header.size)
    }

    fn cached(&self, offset: u64) -> Option<(RawObject, usize)> {
        self.cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(offset))
    }

    fn remember(&self, offset: u64, object: &RawObject, depth: usize) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(offset, object, depth);
        }
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn base_offset(&self, kind: &PackEntryKind) -> Option<Result<u64, ObjectId>> {
        match kind {
            PackEntryKind::Base(_) => None,
            PackEntryKind::OfsDelta { base_offset } => Some(Ok(*base_offset)),
            PackEntryKind::RefDelta { base } => {
                Some(self.offsets.get(base).copied().ok_or(*base))
            }
        }
    }

    fn chain_depth(&self, offset: u64) -> anyhow::Result<usize> {
        let mut depth = 0;
        let mut current = offset;

        loop {
            let header = read_entry_header(self.body(), current)?;
            match self.base_offset(&header.kind) {
                None => return Ok(depth),
                Some(Ok(base_offset)) => current = base_offset,
                Some(Err(base)) => {
                    anyhow::bail!(GitError::not_found(format!("delta base {base}")))
                }
            }

            depth += 1;
            self.check_depth(offset, depth)?;
        }
    }

    fn resolve(&self, offset: u64) -> anyhow::Result<Resolution> {
        let mut chain: Vec<(u64, EntryHeader)> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = offset;

        let (base, base_depth) = loop {
            if let Some((object, depth)) = self.cached(current) {
                break (object, depth);
            }
            if !visited.insert(current) {
                anyhow::bail!(GitError::Loop(format!(
                    "delta chain from offset {offset} revisits offset {current}"
                )));
            }
            self.check_depth(offset, chain.len())?;

            let header = read_entry_header(self.body(), current)?;
            let base_offset = match header.kind {
                PackEntryKind::Base(object_type) => {
                    let (payload, _) = self.inflate(&header)?;
                    let object = RawObject::new(object_type, payload);
                    if !chain.is_empty() {
                        self.remember(current, &object, 0);
                    }
                    break (object, 0);
                }
                PackEntryKind::OfsDelta { base_offset } => base_offset,
                PackEntryKind::RefDelta { base } => match self.offsets.get(&base) {
                    Some(base_offset) => *base_offset,
                    None => return Ok(Resolution::MissingBase(base)),
                },
            };

            chain.push((current, header));
            current = base_offset;
        };
        self.check_depth(offset, chain.len() + base_depth)?;

        let mut object = base;
        let mut depth = base_depth;
        while let Some((entry_offset, header)) = chain.pop() {
            let (delta, _) = self.inflate(&header)?;
            object = RawObject::new(object.object_type, apply_delta(&object.data, &delta)?);
            depth += 1;
            // everything but the requested entry served as a base
            if entry_offset != offset {
                self.remember(entry_offset, &object, depth);
            }
        }

        Ok(Resolution::Resolved(object))
    }

    fn check_depth(&self, offset: u64, depth: usize) -> anyhow::Result<()> {
        if depth > self.max_delta_depth {
            anyhow::bail!(GitError::Loop(format!(
                "delta chain from offset {offset} is deeper than {}",
                self.max_delta_depth
            )));
        }
        Ok(())
    }

    fn read_verified(&self, oid: &ObjectId, offset: u64) -> anyhow::Result<RawObject> {
        let object = match self.resolve(offset)? {
            Resolution::Resolved(object) => object,
            Resolution::MissingBase(base) => {
                anyhow::bail!(GitError::not_found(format!(
                    "delta base {base} for object {oid}"
                )))
            }
        };

        let actual = object.oid();
        if actual != *oid {
            warn!(expected = %oid, %actual, offset, "packed object failed verification");
            anyhow::bail!(GitError::integrity(oid, &actual));
        }

        Ok(object)
    }
}

impl ObjectAccess for PackFile {
    fn read_object(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        self.read(object_id)
    }

    fn has_object(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        Ok(self.contains(object_id))
    }
}
