use crate::areas::repository::Repository;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::log::object_list::list_objects_excluding;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::delta;
use crate::artifacts::pack::pack_index::PackIndex;
use crate::artifacts::pack::pack_writer::PackWriter;
use crate::commands::plumbing::rev_list::RevisionRange;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use anyhow::Context;
use tracing::{debug, info};

impl Repository {
    /// Pack every object the range introduces: its commits, then their trees and blobs
    ///
    /// A tree or blob is stored as an offset delta against the previous full
    /// object of its type when the delta is under half its size.
    pub fn pack_objects(&self, range: &RevisionRange) -> anyhow::Result<(Bytes, PackIndex)> {
        let commits = self.rev_list_commits(range)?;
        let excluded = self.objects_reachable_from_ends(range)?;
        let trees = commits
            .iter()
            .map(|(_, commit)| *commit.tree_oid())
            .collect::<Vec<_>>();

        let mut oids = commits.iter().map(|(oid, _)| *oid).collect::<Vec<_>>();
        oids.extend(list_objects_excluding(self, &trees, &excluded)?);

        let mut writer = PackWriter::new(self.config().compression_level);
        let mut bases: HashMap<ObjectType, (u64, RawObject)> = HashMap::new();
        let mut deltas = 0usize;

        for oid in &oids {
            let object = self.read_object(oid)?;

            if object.object_type != ObjectType::Commit
                && let Some((base_offset, base)) = bases.get(&object.object_type)
                && delta::encode(&base.data, &object.data).len() < object.size() / 2
            {
                writer.write_ofs_delta(&object, *base_offset, base)?;
                deltas += 1;
                continue;
            }

            let offset = writer.write_object(&object)?;
            bases.insert(object.object_type, (offset, object));
        }

        debug!(objects = oids.len(), deltas, "packed objects");
        writer.finish()
    }

    /// Pack the range given as `rev-list` arguments into `<prefix>-<checksum>.pack`
    /// with its `.idx`, printing the checksum
    pub fn write_pack_objects(&self, prefix: &str, arguments: &[String]) -> anyhow::Result<ObjectId> {
        let range = self.parse_revision_range(arguments)?;
        let (data, index) = self.pack_objects(&range)?;
        let checksum = *index.pack_checksum();

        let pack_path = format!("{prefix}-{checksum}.pack");
        let index_path = format!("{prefix}-{checksum}.idx");
        self.storage()
            .write(Path::new(&pack_path), &data)
            .with_context(|| format!("failed to write {pack_path}"))?;
        self.storage()
            .write(Path::new(&index_path), &index.serialize()?)
            .with_context(|| format!("failed to write {index_path}"))?;

        info!(pack = %pack_path, objects = index.len(), "wrote pack");
        writeln!(self.writer(), "{checksum}")?;

        Ok(checksum)
    }
}
