//! Repository stores
//!
//! - `storage`: byte storage capability (filesystem or in memory)
//! - `database`: loose object store
//! - `packs`: published packfiles
//! - `refs`: reference store (branches, HEAD, tags, remote-tracking refs)
//! - `index`: staging area and its stat cache
//! - `repository`: the stores of one git directory, composed

pub mod database;
pub mod index;
pub mod packs;
pub mod refs;
pub mod repository;
pub mod storage;
