//! Error taxonomy shared by every decoding and resolution boundary
//!
//! Functions across the crate return `anyhow::Result`, so these variants travel
//! inside an `anyhow::Error`. Callers classify a failure with
//! `err.downcast_ref::<GitError>()`, which still works after `.context(...)`
//! has been attached on the way up.

use crate::artifacts::objects::object_id::ObjectId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitError {
    /// Malformed bytes: object header, pack entry, delta instruction, pkt-line length
    #[error("format error: {0}")]
    Format(String),

    /// Recomputed address does not match the expected one
    #[error("integrity error: expected {expected}, computed {actual}")]
    Integrity { expected: String, actual: String },

    /// Missing object or reference
    #[error("not found: {0}")]
    NotFound(String),

    /// Symbolic ref cycle, delta cycle, or a configured chain limit exceeded
    #[error("loop detected: {0}")]
    Loop(String),

    /// Reference name rejected by the validity grammar
    #[error("invalid ref name: {0}")]
    InvalidRefName(String),
}

impl GitError {
    pub fn format(message: impl Into<String>) -> Self {
        GitError::Format(message.into())
    }

    pub fn integrity(expected: &ObjectId, actual: &ObjectId) -> Self {
        GitError::Integrity {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        GitError::NotFound(what.into())
    }

    pub fn is_not_found(error: &anyhow::Error) -> bool {
        matches!(error.downcast_ref::<GitError>(), Some(GitError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    fn failing() -> anyhow::Result<()> {
        anyhow::bail!(GitError::not_found("refs/heads/missing"))
    }

    #[test]
    fn downcast_survives_context() {
        let error = failing().context("while resolving").unwrap_err();

        assert!(GitError::is_not_found(&error));
        pretty_assertions::assert_eq!(
            error.downcast_ref::<GitError>(),
            Some(&GitError::NotFound("refs/heads/missing".to_string()))
        );
    }
}
