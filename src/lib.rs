//! A Git-compatible object store
//!
//! Loose objects and packfiles behind one read interface, references with
//! symbolic resolution and compare-and-swap updates, a commit graph walker,
//! pkt-line transport framing and the index with its staleness cache.

pub mod areas;
pub mod artifacts;
pub mod commands;
