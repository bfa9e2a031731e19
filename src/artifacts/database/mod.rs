//! Object access contract shared by every object source
//!
//! This module defines the read-side seam: loose objects, packfiles and the
//! repository that composes both are all consumed through `ObjectAccess`.

pub mod object_access;
