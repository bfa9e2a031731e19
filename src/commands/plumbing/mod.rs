//! Plumbing commands (low-level Git operations)
//!
//! Each command is an `impl Repository` block that writes its output to the
//! repository's writer, so the CLI and tests drive the same code.
//!
//! ## Commands
//!
//! - `init`, `hash-object`, `cat-file`: object store access
//! - `rev-list`, `pack-objects`: history walking and pack generation
//! - `show-ref`, `check-ref-format`, `update-ref`, `symbolic-ref`, `pack-refs`: references
//! - `add`, `status`: the index and its staleness cache
//! - `index-pack`, `verify-pack`, `unpack-objects`, `fetch-pack`: packs

pub mod add;
pub mod cat_file;
pub mod check_ref_format;
pub mod fetch_pack;
pub mod hash_object;
pub mod index_pack;
pub mod init;
pub mod pack_objects;
pub mod pack_refs;
pub mod rev_list;
pub mod show_ref;
pub mod status;
pub mod symbolic_ref;
pub mod unpack_objects;
pub mod update_ref;
pub mod verify_pack;
