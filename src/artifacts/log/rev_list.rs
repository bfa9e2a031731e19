use crate::artifacts::core::error::GitError;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bitflags::bitflags;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::debug;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct WalkFlags: u8 {
        /// Queued at least once
        const ADDED = 0b001;
        /// Popped and expanded
        const SEEN = 0b010;
        /// Reachable from an end
        const UNINTERESTING = 0b100;
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct QueueItem {
    timestamp: i64,
    sequence: Reverse<u64>,
    oid: ObjectId,
}

/// Commits reachable from `starts` but not from `ends`
///
/// Output is newest first by committer timestamp; commits with equal
/// timestamps keep the order in which they were discovered, so a first parent
/// comes before later parents. Annotated tags among the inputs are peeled.
pub fn walk<O: ObjectAccess + ?Sized>(
    objects: &O,
    starts: &[ObjectId],
    ends: &[ObjectId],
) -> anyhow::Result<Vec<(ObjectId, Commit)>> {
    let mut walker = RevWalk::new(objects);

    for start in starts {
        let oid = walker.peel_to_commit(start)?;
        walker.enqueue(oid, WalkFlags::empty())?;
    }
    for end in ends {
        let oid = walker.peel_to_commit(end)?;
        walker.enqueue(oid, WalkFlags::UNINTERESTING)?;
    }

    walker.run()
}

struct RevWalk<'o, O: ObjectAccess + ?Sized> {
    objects: &'o O,
    flags: HashMap<ObjectId, WalkFlags>,
    commits: HashMap<ObjectId, Commit>,
    queue: BinaryHeap<QueueItem>,
    sequence: u64,
    /// Queued commits not (yet) known to be reachable from an end
    interesting_queued: usize,
    /// Popped interesting commits not (yet) known to be reachable from an end
    interesting_popped: usize,
}

impl<'o, O: ObjectAccess + ?Sized> RevWalk<'o, O> {
    fn new(objects: &'o O) -> Self {
        RevWalk {
            objects,
            flags: HashMap::new(),
            commits: HashMap::new(),
            queue: BinaryHeap::new(),
            sequence: 0,
            interesting_queued: 0,
            interesting_popped: 0,
        }
    }

    fn peel_to_commit(&self, oid: &ObjectId) -> anyhow::Result<ObjectId> {
        let (peeled, object_type) = self.objects.peel(oid)?;
        if object_type != ObjectType::Commit {
            anyhow::bail!(GitError::format(format!(
                "{oid} peels to a {object_type}, not a commit"
            )));
        }
        Ok(peeled)
    }

    fn flags(&self, oid: &ObjectId) -> WalkFlags {
        self.flags.get(oid).copied().unwrap_or_default()
    }

    fn commit(&mut self, oid: &ObjectId) -> anyhow::Result<&Commit> {
        if !self.commits.contains_key(oid) {
            let commit = self
                .objects
                .parse_object_as_commit(oid)?
                .ok_or_else(|| GitError::format(format!("{oid} is not a commit")))?;
            self.commits.insert(*oid, commit);
        }

        self.commits
            .get(oid)
            .ok_or_else(|| GitError::not_found(format!("commit {oid}")).into())
    }

    /// Add `flags` to `oid` and queue it unless it already was
    fn enqueue(&mut self, oid: ObjectId, flags: WalkFlags) -> anyhow::Result<()> {
        let previous = self.flags(&oid);
        let current = previous | flags | WalkFlags::ADDED;
        self.flags.insert(oid, current);

        if previous.contains(WalkFlags::ADDED) {
            let was_interesting_in_queue = !previous.contains(WalkFlags::SEEN)
                && !previous.contains(WalkFlags::UNINTERESTING);
            if was_interesting_in_queue && current.contains(WalkFlags::UNINTERESTING) {
                self.interesting_queued -= 1;
            }
            return Ok(());
        }

        if !current.contains(WalkFlags::UNINTERESTING) {
            self.interesting_queued += 1;
        }
        let timestamp = self.commit(&oid)?.timestamp();
        self.queue.push(QueueItem {
            timestamp,
            sequence: Reverse(self.sequence),
            oid,
        });
        self.sequence += 1;

        Ok(())
    }

    /// Pop commits until nothing left in the queue can change the result
    ///
    /// Timestamps only order the output. Once no interesting commit is queued,
    /// the uninteresting frontier is still drained while any popped commit
    /// might be reachable from it, since a skewed clock can put an end's
    /// ancestors far behind the commits they lead to.
    fn run(mut self) -> anyhow::Result<Vec<(ObjectId, Commit)>> {
        let mut popped = Vec::new();

        while let Some(item) = self.queue.pop() {
            let oid = item.oid;
            let flags = self.flags(&oid);
            self.flags.insert(oid, flags | WalkFlags::SEEN);

            let parents = self.commit(&oid)?.parents().to_vec();
            if flags.contains(WalkFlags::UNINTERESTING) {
                self.mark_parents_uninteresting(&parents)?;
            } else {
                self.interesting_queued -= 1;
                self.interesting_popped += 1;
                popped.push(oid);
                for parent in parents {
                    self.enqueue(parent, WalkFlags::empty())?;
                }
            }

            if self.interesting_queued == 0 && self.interesting_popped == 0 {
                break;
            }
        }

        debug!(popped = popped.len(), remaining = self.queue.len(), "commit walk finished");

        let flags = &self.flags;
        let commits = &mut self.commits;
        popped
            .into_iter()
            .filter(|oid| {
                !flags
                    .get(oid)
                    .is_some_and(|flags| flags.contains(WalkFlags::UNINTERESTING))
            })
            .map(|oid| {
                let commit = commits
                    .remove(&oid)
                    .ok_or_else(|| GitError::not_found(format!("commit {oid}")))?;
                Ok((oid, commit))
            })
            .collect()
    }

    /// Flag every ancestor already reached through `parents` as uninteresting
    ///
    /// Ancestors that were already expanded are followed through their own
    /// parents; the rest are queued so the walk reaches them in order.
    fn mark_parents_uninteresting(&mut self, parents: &[ObjectId]) -> anyhow::Result<()> {
        let mut stack = parents.to_vec();

        while let Some(oid) = stack.pop() {
            let flags = self.flags(&oid);
            if flags.contains(WalkFlags::UNINTERESTING) {
                continue;
            }

            if flags.contains(WalkFlags::SEEN) {
                // popped while still interesting
                self.interesting_popped -= 1;
                self.flags.insert(oid, flags | WalkFlags::UNINTERESTING);
                stack.extend_from_slice(self.commit(&oid)?.parents());
            } else {
                self.enqueue(oid, WalkFlags::UNINTERESTING)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::database::Database;
    use crate::areas::storage::MemoryStorage;
    use crate::artifacts::objects::commit::{Author, TimeZoneOffset};
    use crate::artifacts::objects::tag::Tag;
    use crate::artifacts::objects::tree::Tree;
    use std::sync::Arc;

    struct History {
        database: Database,
        tree: ObjectId,
    }

    impl History {
        fn new() -> Self {
            let database = Database::new(Arc::new(MemoryStorage::new()), ".git/objects", 1);
            let tree = database.store(&Tree::new(vec![])).unwrap();
            History { database, tree }
        }

        fn commit(&self, message: &str, parents: &[ObjectId], timestamp: i64) -> ObjectId {
            let author = Author::new_with_timestamp(
                "A U Thor".to_string(),
                "author@example.com".to_string(),
                timestamp,
                TimeZoneOffset::utc(),
            );
            self.database
                .store(&Commit::new(parents.to_vec(), self.tree, author, message.to_string()))
                .unwrap()
        }

        fn walk(&self, starts: &[ObjectId], ends: &[ObjectId]) -> Vec<ObjectId> {
            walk(&self.database, starts, ends)
                .unwrap()
                .into_iter()
                .map(|(oid, _)| oid)
                .collect()
        }
    }

    #[test]
    fn linear_history_newest_first() {
        let history = History::new();
        let c3 = history.commit("c3", &[], 100);
        let c2 = history.commit("c2", &[c3], 200);
        let c1 = history.commit("c1", &[c2], 300);

        pretty_assertions::assert_eq!(history.walk(&[c1], &[]), vec![c1, c2, c3]);
        pretty_assertions::assert_eq!(history.walk(&[c1], &[c2]), vec![c1]);
        pretty_assertions::assert_eq!(history.walk(&[c1], &[c1]), vec![]);
    }

    #[test]
    fn equal_timestamps_keep_discovery_order() {
        let history = History::new();
        let root = history.commit("root", &[], 100);
        let left = history.commit("left", &[root], 100);
        let right = history.commit("right", &[root], 100);
        let merge = history.commit("merge", &[left, right], 100);

        pretty_assertions::assert_eq!(
            history.walk(&[merge], &[]),
            vec![merge, left, right, root]
        );
    }

    #[test]
    fn merge_excludes_everything_reachable_from_the_end() {
        //   base - a1 - a2 (start)
        //       \
        //        b1 (end)
        let history = History::new();
        let base = history.commit("base", &[], 100);
        let a1 = history.commit("a1", &[base], 200);
        let b1 = history.commit("b1", &[base], 250);
        let a2 = history.commit("a2", &[a1], 300);

        pretty_assertions::assert_eq!(history.walk(&[a2], &[b1]), vec![a2, a1]);
        pretty_assertions::assert_eq!(history.walk(&[a2, b1], &[]), vec![a2, b1, a1, base]);
    }

    #[test]
    fn long_skewed_end_chain_still_excludes_shared_commits() {
        // end (200) -> e1..e7 (all at 1) -> shared (90) <- start (100)
        let history = History::new();
        let shared = history.commit("shared", &[], 90);
        let start = history.commit("start", &[shared], 100);
        let mut tip = shared;
        for i in 1..=7 {
            tip = history.commit(&format!("e{i}"), &[tip], 1);
        }
        let end = history.commit("end", &[tip], 200);

        pretty_assertions::assert_eq!(history.walk(&[start], &[end]), vec![start]);
    }

    #[test]
    fn walk_stops_once_the_end_covers_everything_popped() {
        // start is an ancestor of end: nothing is interesting after the first pops
        let history = History::new();
        let root = history.commit("root", &[], 100);
        let start = history.commit("start", &[root], 200);
        let end = history.commit("end", &[start], 300);

        pretty_assertions::assert_eq!(history.walk(&[start], &[end]), vec![]);
        pretty_assertions::assert_eq!(history.walk(&[end], &[start]), vec![end]);
    }

    #[test]
    fn clock_skew_is_absorbed() {
        // the end's ancestor has a newer timestamp than the start's chain
        let history = History::new();
        let old = history.commit("old", &[], 1000);
        let start = history.commit("start", &[old], 50);
        let end = history.commit("end", &[old], 10);

        pretty_assertions::assert_eq!(history.walk(&[start], &[end]), vec![start]);
    }

    #[test]
    fn annotated_tags_are_peeled() {
        let history = History::new();
        let c1 = history.commit("c1", &[], 100);
        let tag = history
            .database
            .store(&Tag::new(
                c1,
                ObjectType::Commit,
                "v1".to_string(),
                None,
                "release\n".to_string(),
            ))
            .unwrap();

        pretty_assertions::assert_eq!(history.walk(&[tag], &[]), vec![c1]);
    }

    #[test]
    fn non_commit_start_is_rejected() {
        let history = History::new();
        assert!(walk(&history.database, &[history.tree], &[]).is_err());
    }

    #[test]
    fn missing_parent_is_fatal() {
        let history = History::new();
        let dangling = history.commit("dangling", &[ObjectId::digest(b"gone")], 100);

        let error = walk(&history.database, &[dangling], &[]).unwrap_err();
        assert!(GitError::is_not_found(&error));
    }
}
