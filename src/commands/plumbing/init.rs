use crate::areas::repository::{GIT_DIR, Repository};
use crate::artifacts::refs::{HEAD_REF_NAME, HEADS_PREFIX};
use anyhow::Context;
use std::path::Path;
use tracing::info;

const DEFAULT_BRANCH: &str = "master";

impl Repository {
    pub fn init(&self) -> anyhow::Result<()> {
        let git_dir = Path::new(GIT_DIR);
        let reinitialized = self.storage().exists(&git_dir.join(HEAD_REF_NAME))?;

        for dir in ["objects/pack", "objects/info", "refs/heads", "refs/tags"] {
            self.storage()
                .create_dir(&git_dir.join(dir))
                .with_context(|| format!("Failed to create {GIT_DIR}/{dir} directory"))?;
        }

        if !reinitialized {
            self.refs()
                .set_symbolic_ref(HEAD_REF_NAME, &format!("{HEADS_PREFIX}{DEFAULT_BRANCH}"))
                .context("Failed to create initial HEAD reference")?;
        }
        info!(path = %self.path().display(), reinitialized, "initialized repository");

        writeln!(
            self.writer(),
            "{} Git repository in {}",
            if reinitialized {
                "Reinitialized existing"
            } else {
                "Initialized empty"
            },
            self.path().join(GIT_DIR).display()
        )?;

        Ok(())
    }
}
