use bytes::Bytes;
use gitcore::areas::repository::Repository;
use gitcore::artifacts::index::entry_mode::{EntryMode, FileMode};
use gitcore::artifacts::objects::commit::{Author, Commit, TimeZoneOffset};
use gitcore::artifacts::objects::object::RawObject;
use gitcore::artifacts::objects::object_id::ObjectId;
use gitcore::artifacts::objects::object_type::ObjectType;
use gitcore::artifacts::objects::tree::{Tree, TreeEntry};

pub fn author(timestamp: i64) -> Author {
    Author::new_with_timestamp(
        "A U Thor".to_string(),
        "author@example.com".to_string(),
        timestamp,
        TimeZoneOffset::utc(),
    )
}

pub fn blob(repository: &Repository, content: &str) -> ObjectId {
    repository
        .database()
        .put(&RawObject::new(ObjectType::Blob, Bytes::copy_from_slice(content.as_bytes())))
        .unwrap()
}

/// A flat tree holding `files` as regular blobs
pub fn tree(repository: &Repository, files: &[(&str, &str)]) -> ObjectId {
    let entries = files
        .iter()
        .map(|(name, content)| {
            TreeEntry::new(
                EntryMode::File(FileMode::Regular),
                name.to_string(),
                blob(repository, content),
            )
        })
        .collect();

    repository.database().store(&Tree::new(entries)).unwrap()
}

pub fn commit(
    repository: &Repository,
    message: &str,
    parents: &[ObjectId],
    timestamp: i64,
    files: &[(&str, &str)],
) -> ObjectId {
    let tree = tree(repository, files);
    repository
        .database()
        .store(&Commit::new(
            parents.to_vec(),
            tree,
            author(timestamp),
            format!("{message}\n"),
        ))
        .unwrap()
}

/// C1 <- C2 <- C3, each adding a file; `master` points at C3
pub fn linear_history(repository: &Repository) -> [ObjectId; 3] {
    let c1 = commit(repository, "first", &[], 1_700_000_000, &[("a.txt", "one\n")]);
    let c2 = commit(
        repository,
        "second",
        &[c1],
        1_700_000_100,
        &[("a.txt", "one\n"), ("b.txt", "two\n")],
    );
    let c3 = commit(
        repository,
        "third",
        &[c2],
        1_700_000_200,
        &[("a.txt", "one\n"), ("b.txt", "two\n"), ("c.txt", "three\n")],
    );
    repository
        .refs()
        .update_ref("refs/heads/master", c3, None)
        .unwrap();

    [c1, c2, c3]
}
