use crate::areas::repository::{GIT_DIR, Repository};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

impl Repository {
    /// Stage files, returning the paths written to the index
    ///
    /// Directories are expanded recursively. Tracked files below a given path
    /// that no longer exist are dropped from the index.
    pub async fn add(&self, paths: &[String]) -> anyhow::Result<Vec<String>> {
        let index = self.index();
        let mut index = index.lock().await;

        // Load the index file from storage
        index.rehydrate()?;

        let mut staged = Vec::new();
        for path in paths {
            let prefix = normalize_pathspec(path);
            let files = self.workspace_files(prefix)?;
            if files.is_empty() {
                warn!(path = %path, "pathspec did not match any files");
            }

            let vanished = index
                .entries()
                .filter(|entry| is_under(&entry.name, prefix) && !files.contains(&entry.name))
                .map(|entry| entry.name.clone())
                .collect::<Vec<_>>();
            for name in vanished {
                debug!(path = %name, "removing deleted file from index");
                index.remove(&name);
            }

            for file in files {
                let file_path = Path::new(&file);
                let (Some(data), Some(stat)) =
                    (self.storage().read(file_path)?, self.storage().stat(file_path)?)
                else {
                    continue;
                };

                let blob_id = self.database().put(&RawObject::new(ObjectType::Blob, data))?;
                index.add(IndexEntry::new(file.clone(), blob_id, stat));
                staged.push(file);
            }
        }

        index.write_updates()?;

        Ok(staged)
    }

    /// Work-tree files at or below `prefix`, outside the git directory
    pub(crate) fn workspace_files(&self, prefix: &str) -> anyhow::Result<BTreeSet<String>> {
        if !prefix.is_empty()
            && let Some(stat) = self.storage().stat(Path::new(prefix))?
            && !stat.mode.is_tree()
        {
            return Ok(BTreeSet::from([prefix.to_string()]));
        }

        let mut files = BTreeSet::new();
        for relative in self.storage().list(Path::new(prefix))? {
            let relative = relative
                .to_str()
                .with_context(|| format!("non UTF-8 path {}", relative.display()))?;
            let name = if prefix.is_empty() {
                relative.to_string()
            } else {
                format!("{prefix}/{relative}")
            };

            if !is_under(&name, GIT_DIR) {
                files.insert(name);
            }
        }

        Ok(files)
    }
}

/// Path as given on the command line, relative to the work tree root
fn normalize_pathspec(path: &str) -> &str {
    let path = path.trim_start_matches("./").trim_end_matches('/');
    if path == "." { "" } else { path }
}

fn is_under(name: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || name == prefix
        || name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(".", "")]
    #[case("./", "")]
    #[case("./src/", "src")]
    #[case("a/b.txt", "a/b.txt")]
    fn pathspecs_are_normalized(#[case] input: &str, #[case] expected: &str) {
        pretty_assertions::assert_eq!(normalize_pathspec(input), expected);
    }

    #[rstest]
    #[case("a/b.txt", "", true)]
    #[case("a/b.txt", "a", true)]
    #[case("a/b.txt", "a/b.txt", true)]
    #[case("ab/c.txt", "a", false)]
    #[case(".git/HEAD", ".git", true)]
    fn prefix_matching_respects_components(
        #[case] name: &str,
        #[case] prefix: &str,
        #[case] expected: bool,
    ) {
        pretty_assertions::assert_eq!(is_under(name, prefix), expected);
    }
}
