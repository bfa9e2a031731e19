//! Commit graph traversal
//!
//! - `rev_list`: commits reachable from a set of starts and not from a set of ends
//! - `object_list`: every tree, blob and tag reachable from a set of roots
//!
//! ## Algorithm
//!
//! The commit walk uses a priority queue ordered by committer timestamp,
//! newest first, with insertion order breaking ties. Commits reachable from
//! an end are flagged uninteresting and the flag is propagated to their
//! parents, so the walk can stop once only uninteresting commits are queued.

pub mod object_list;
pub mod rev_list;
