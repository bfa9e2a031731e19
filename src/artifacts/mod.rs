//! Git data structures and algorithms
//!
//! - `core`: errors, configuration, compression
//! - `database`: object access on top of any store
//! - `index`: index file entries, header and checksum
//! - `log`: commit and object graph walking
//! - `objects`: object kinds and their encodings
//! - `pack`: packfiles, pack indexes and deltas
//! - `refs`: reference names and revision expressions
//! - `transport`: pkt-line framing and reference advertisements

pub mod core;
pub mod database;
pub mod index;
pub mod log;
pub mod objects;
pub mod pack;
pub mod refs;
pub mod transport;
