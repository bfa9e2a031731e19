use crate::areas::repository::Repository;
use crate::artifacts::database::object_access::ObjectAccess;
use crate::artifacts::refs::{HEADS_PREFIX, PEELED_SUFFIX, REFS_PREFIX, TAGS_PREFIX};

impl Repository {
    /// List references with their addresses
    ///
    /// `heads` and `tags` narrow the listing; with neither, everything under
    /// `refs/` is shown. `dereference` adds a `^{}` line for annotated tags.
    pub fn show_ref(&self, heads: bool, tags: bool, dereference: bool) -> anyhow::Result<usize> {
        let namespaces = match (heads, tags) {
            (false, false) => vec![REFS_PREFIX],
            (true, false) => vec![HEADS_PREFIX],
            (false, true) => vec![TAGS_PREFIX],
            (true, true) => vec![HEADS_PREFIX, TAGS_PREFIX],
        };

        let mut shown = 0;
        for namespace in namespaces {
            for (name, oid) in self.refs().list_resolved(namespace)? {
                writeln!(self.writer(), "{oid} {name}")?;
                shown += 1;

                if dereference {
                    let (peeled, _) = self.peel(&oid)?;
                    if peeled != oid {
                        writeln!(self.writer(), "{peeled} {name}{PEELED_SUFFIX}")?;
                    }
                }
            }
        }

        Ok(shown)
    }
}
