use crate::areas::repository::Repository;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::log::object_list::list_objects_excluding;
use crate::artifacts::log::rev_list::walk;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::refs::HEAD_REF_NAME;
use std::collections::HashSet;

/// Commits to include and exclude, as named on a command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionRange {
    pub starts: Vec<ObjectId>,
    pub ends: Vec<ObjectId>,
}

impl Repository {
    /// Parse `<rev>`, `^<rev>` and `<a>..<b>` arguments
    ///
    /// Either side of `..` defaults to `HEAD`, and so do the starts when only
    /// exclusions are given.
    pub fn parse_revision_range(&self, arguments: &[String]) -> anyhow::Result<RevisionRange> {
        let mut range = RevisionRange::default();

        for argument in arguments {
            if let Some(excluded) = argument.strip_prefix('^') {
                range.ends.push(self.resolve_revision(excluded)?);
            } else if let Some((from, to)) = argument.split_once("..") {
                range.ends.push(self.resolve_revision(or_head(from))?);
                range.starts.push(self.resolve_revision(or_head(to))?);
            } else {
                range.starts.push(self.resolve_revision(argument)?);
            }
        }

        if range.starts.is_empty() {
            range.starts.push(self.resolve_revision(HEAD_REF_NAME)?);
        }

        Ok(range)
    }

    pub fn rev_list_commits(&self, range: &RevisionRange) -> anyhow::Result<Vec<(ObjectId, Commit)>> {
        walk(self, &range.starts, &range.ends)
    }

    /// Print the commits of the range newest first, then with `objects` every
    /// tree and blob they introduce
    pub fn rev_list(&self, arguments: &[String], objects: bool) -> anyhow::Result<()> {
        let range = self.parse_revision_range(arguments)?;
        let commits = self.rev_list_commits(&range)?;

        for (oid, _) in &commits {
            writeln!(self.writer(), "{oid}")?;
        }

        if objects {
            let excluded = self.objects_reachable_from_ends(&range)?;
            let trees = commits
                .iter()
                .map(|(_, commit)| *commit.tree_oid())
                .collect::<Vec<_>>();
            for oid in list_objects_excluding(self, &trees, &excluded)? {
                writeln!(self.writer(), "{oid}")?;
            }
        }

        Ok(())
    }

    /// Trees and blobs reachable from the range's ends, which need not be sent again
    pub(crate) fn objects_reachable_from_ends(
        &self,
        range: &RevisionRange,
    ) -> anyhow::Result<HashSet<ObjectId>> {
        let mut trees = Vec::with_capacity(range.ends.len());
        for end in &range.ends {
            let (commit_oid, _) = self.peel(end)?;
            if let Some(commit) = self.parse_object_as_commit(&commit_oid)? {
                trees.push(*commit.tree_oid());
            }
        }

        Ok(list_objects_excluding(self, &trees, &HashSet::new())?
            .into_iter()
            .collect())
    }
}

fn or_head(side: &str) -> &str {
    if side.is_empty() { HEAD_REF_NAME } else { side }
}
