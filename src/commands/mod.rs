//! Command implementations
//!
//! Only plumbing is provided: commands that expose the object store, packs,
//! references and the index directly, as building blocks for higher-level tools.

pub mod plumbing;
