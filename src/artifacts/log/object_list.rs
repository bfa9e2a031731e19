use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use std::collections::HashSet;
use std::io::Cursor;

/// Every object reachable from `roots`, each once, in discovery order
///
/// Follows commit to tree, tag to target and tree to entries. Commit parents
/// and gitlink entries are not followed. A missing or unreadable object is an
/// error.
pub fn list_objects<O: ObjectAccess + ?Sized>(
    objects: &O,
    roots: &[ObjectId],
) -> anyhow::Result<Vec<ObjectId>> {
    list_objects_excluding(objects, roots, &HashSet::new())
}

/// Like [`list_objects`], without entering anything in `excluded`
pub fn list_objects_excluding<O: ObjectAccess + ?Sized>(
    objects: &O,
    roots: &[ObjectId],
    excluded: &HashSet<ObjectId>,
) -> anyhow::Result<Vec<ObjectId>> {
    let mut visited = HashSet::new();
    let mut listed = Vec::new();
    let mut stack = roots.iter().rev().map(|oid| (*oid, None)).collect::<Vec<_>>();

    while let Some((oid, expected)) = stack.pop() {
        if excluded.contains(&oid) || !visited.insert(oid) {
            continue;
        }

        // reading verifies the address, so a corrupt blob fails here too
        let raw = objects.read_object(&oid)?;
        if let Some(expected) = expected
            && raw.object_type != expected
        {
            anyhow::bail!(GitError::format(format!(
                "{oid} is a {}, expected a {expected}",
                raw.object_type
            )));
        }
        listed.push(oid);

        match raw.object_type {
            ObjectType::Commit => {
                let commit = Commit::deserialize(Cursor::new(raw.data))?;
                stack.push((*commit.tree_oid(), Some(ObjectType::Tree)));
            }
            ObjectType::Tag => {
                let tag = Tag::deserialize(Cursor::new(raw.data))?;
                stack.push((*tag.target(), Some(tag.target_type())));
            }
            ObjectType::Tree => {
                let tree = Tree::deserialize(Cursor::new(raw.data))?;
                stack.extend(
                    tree.into_entries()
                        .filter(|entry| entry.mode != EntryMode::Submodule)
                        .map(|entry| (entry.oid, Some(entry.mode.object_type())))
                        .collect::<Vec<_>>()
                        .into_iter()
                        .rev(),
                );
            }
            ObjectType::Blob => {}
        }
    }

    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::database::Database;
    use crate::areas::storage::{MemoryStorage, Storage};
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::commit::{Author, TimeZoneOffset};
    use crate::artifacts::objects::tree::TreeEntry;
    use rstest::{fixture, rstest};
    use std::sync::Arc;

    struct Fixture {
        database: Database,
        commit: ObjectId,
        root: ObjectId,
        subtree: ObjectId,
        readme: ObjectId,
        nested: ObjectId,
    }

    #[fixture]
    fn fixture() -> Fixture {
        let database = Database::new(Arc::new(MemoryStorage::new()), ".git/objects", 1);
        let readme = database.store(&Blob::from("readme")).unwrap();
        let nested = database.store(&Blob::from("nested")).unwrap();
        let subtree = database
            .store(&Tree::new(vec![TreeEntry::new(
                EntryMode::File(FileMode::Regular),
                "nested.txt".to_string(),
                nested,
            )]))
            .unwrap();
        let root = database
            .store(&Tree::new(vec![
                TreeEntry::new(EntryMode::File(FileMode::Regular), "README".to_string(), readme),
                TreeEntry::new(EntryMode::Directory, "src".to_string(), subtree),
                // gitlinks point into another repository
                TreeEntry::new(EntryMode::Submodule, "vendor".to_string(), ObjectId::digest(b"x")),
            ]))
            .unwrap();
        let author = Author::new_with_timestamp(
            "A U Thor".to_string(),
            "author@example.com".to_string(),
            0,
            TimeZoneOffset::utc(),
        );
        let commit = database
            .store(&Commit::new(vec![], root, author, "initial\n".to_string()))
            .unwrap();

        Fixture {
            database,
            commit,
            root,
            subtree,
            readme,
            nested,
        }
    }

    #[rstest]
    fn lists_the_closure_of_a_commit(fixture: Fixture) {
        let listed = list_objects(&fixture.database, &[fixture.commit]).unwrap();

        pretty_assertions::assert_eq!(
            listed,
            vec![
                fixture.commit,
                fixture.root,
                fixture.readme,
                fixture.subtree,
                fixture.nested
            ]
        );
    }

    #[rstest]
    fn excluded_trees_are_not_entered(fixture: Fixture) {
        let excluded = HashSet::from([fixture.subtree]);
        let listed =
            list_objects_excluding(&fixture.database, &[fixture.commit], &excluded).unwrap();

        assert!(!listed.contains(&fixture.subtree));
        assert!(!listed.contains(&fixture.nested));
        assert!(listed.contains(&fixture.readme));
    }

    #[rstest]
    fn missing_blob_is_fatal(fixture: Fixture) {
        let tree = fixture
            .database
            .store(&Tree::new(vec![TreeEntry::new(
                EntryMode::File(FileMode::Regular),
                "ghost".to_string(),
                ObjectId::digest(b"ghost"),
            )]))
            .unwrap();

        let error = list_objects(&fixture.database, &[tree]).unwrap_err();
        assert!(GitError::is_not_found(&error));
    }

    #[test]
    fn corrupt_blob_is_fatal() {
        let storage = Arc::new(MemoryStorage::new());
        let database = Database::new(storage.clone(), ".git/objects", 1);
        let blob = database.store(&Blob::from("content")).unwrap();
        let tree = database
            .store(&Tree::new(vec![TreeEntry::new(
                EntryMode::File(FileMode::Regular),
                "file.txt".to_string(),
                blob,
            )]))
            .unwrap();
        storage
            .write(&std::path::Path::new(".git/objects").join(blob.to_path()), b"garbage")
            .unwrap();

        let error = list_objects(&database, &[tree]).unwrap_err();
        assert!(error.downcast_ref::<GitError>().is_some());
    }
}
