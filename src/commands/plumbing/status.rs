use crate::areas::repository::Repository;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_type::ObjectType;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileStatus {
    Deleted,
    Modified,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Deleted => write!(f, "D"),
            FileStatus::Modified => write!(f, "M"),
        }
    }
}

impl Repository {
    /// Tracked paths whose work-tree file was deleted or modified
    ///
    /// Only entries whose cached stat is stale, or too recent to trust, are
    /// rehashed. Entries found unchanged get their stat refreshed.
    pub async fn workspace_changes(&self) -> anyhow::Result<BTreeMap<String, FileStatus>> {
        let index = self.index();
        let mut index = index.lock().await;
        index.rehydrate()?;

        let mut changes = BTreeMap::new();
        let entries = index.entries().cloned().collect::<Vec<_>>();

        for entry in entries {
            let path = Path::new(&entry.name);
            let live = match self.storage().stat(path)? {
                Some(live) if !live.mode.is_tree() => live,
                _ => {
                    changes.insert(entry.name, FileStatus::Deleted);
                    continue;
                }
            };

            if !entry.is_stale(&live) && !index.is_racily_clean(&entry) {
                continue;
            }

            if entry.metadata.mode != live.mode || entry.metadata.size != live.size {
                changes.insert(entry.name, FileStatus::Modified);
                continue;
            }

            let Some(data) = self.storage().read(path)? else {
                changes.insert(entry.name, FileStatus::Deleted);
                continue;
            };
            if RawObject::new(ObjectType::Blob, data).oid() != entry.oid {
                changes.insert(entry.name, FileStatus::Modified);
            } else {
                debug!(path = %entry.name, "content unchanged, refreshing cached stat");
                index.update_entry_stat(&entry.name, live);
            }
        }

        if index.is_changed() {
            index.write_updates()?;
        }

        Ok(changes)
    }

    pub async fn status(&self) -> anyhow::Result<()> {
        let changes = self.workspace_changes().await?;

        for (file, status) in changes {
            writeln!(self.writer(), " {status} {file}")?;
        }

        Ok(())
    }
}
