//! Smart-protocol framing
//!
//! - `pkt_line`: length-prefixed frames over a buffer or an async reader
//! - `advertisement`: the reference list a server sends first

pub mod advertisement;
pub mod pkt_line;

/// Largest frame, prefix included
pub const MAX_PKT_LEN: usize = 65520;

/// Width of the hex length prefix
pub const PKT_LEN_SIZE: usize = 4;
