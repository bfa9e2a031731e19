use crate::artifacts::core::error::GitError;
use crate::artifacts::refs::{
    HEAD_REF_NAME, HEADS_PREFIX, INVALID_REF_NAME_REGEX, REF_ALIASES, REFS_PREFIX, REMOTES_PREFIX,
    TAGS_PREFIX,
};
use anyhow::Context;
use regex::Regex;

/// Checks names against the reference grammar
///
/// The pattern is compiled once; the reference store keeps one of these for
/// its whole lifetime.
#[derive(Debug, Clone)]
pub struct RefNameValidator {
    invalid: Regex,
}

impl RefNameValidator {
    pub fn new() -> anyhow::Result<Self> {
        let invalid = Regex::new(INVALID_REF_NAME_REGEX)
            .with_context(|| format!("invalid ref name regex: {INVALID_REF_NAME_REGEX}"))?;

        Ok(RefNameValidator { invalid })
    }

    pub fn is_valid(&self, name: &str) -> bool {
        !name.is_empty() && !self.invalid.is_match(name)
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.is_valid(name) {
            Ok(())
        } else {
            anyhow::bail!(GitError::InvalidRefName(name.to_string()))
        }
    }

    /// A name the reference store may write: valid, and either under `refs/`
    /// or a pseudo-reference like `HEAD`
    ///
    /// Everything else in the git directory (`index`, `config`,
    /// `packed-refs`, ...) is off limits.
    pub fn validate_storable(&self, name: &str) -> anyhow::Result<()> {
        self.validate(name)?;
        if name.starts_with(REFS_PREFIX) || is_pseudo_ref(name) {
            Ok(())
        } else {
            anyhow::bail!(GitError::InvalidRefName(name.to_string()))
        }
    }
}

/// `HEAD`, `ORIG_HEAD`, `FETCH_HEAD`: upper case letters, digits and `_`
pub fn is_pseudo_ref(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Short form of a full reference name
///
/// `refs/heads/main` becomes `main`, `refs/tags/v1` becomes `v1`, and
/// `refs/remotes/origin/HEAD` becomes `origin`. Anything else is returned as is.
pub fn abbreviate(name: &str) -> &str {
    if let Some(branch) = name.strip_prefix(HEADS_PREFIX) {
        branch
    } else if let Some(tag) = name.strip_prefix(TAGS_PREFIX) {
        tag
    } else if let Some(remote) = name.strip_prefix(REMOTES_PREFIX) {
        remote.strip_suffix("/HEAD").unwrap_or(remote)
    } else {
        name
    }
}

/// Full names tried, in order, when resolving a user-supplied name
pub fn lookup_candidates(name: &str) -> Vec<String> {
    let name = *REF_ALIASES.get(name).unwrap_or(&name);
    if name.is_empty() || name == HEAD_REF_NAME {
        return vec![HEAD_REF_NAME.to_string()];
    }

    let mut candidates = Vec::with_capacity(4);
    if name.starts_with(REFS_PREFIX) {
        candidates.push(name.to_string());
    }
    candidates.push(format!("{REFS_PREFIX}{name}"));
    candidates.push(format!("{HEADS_PREFIX}{name}"));
    candidates.push(format!("{TAGS_PREFIX}{name}"));

    candidates
}
