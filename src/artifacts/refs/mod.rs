//! Reference names and revision expressions

pub mod ref_name;
pub mod revision;

/// Anything matching this is not a valid reference name
///
/// Rejects a component starting with `.`, `..` anywhere, a leading, trailing
/// or doubled `/`, a `.lock` component suffix, a trailing `.`, `@{`, a lone
/// `@`, and control characters, space, `~^:?*[\` and DEL.
pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|/\.|\.\.|^/|/$|//|\.lock$|\.lock/|\.$|@\{|^@$|[\x00-\x20\*:\?\[\\~\^\x7f]";
pub const PARENT_REGEX: &str = r"^(.+)\^$";
pub const ANCESTOR_REGEX: &str = r"^(.+)\~(\d+)$";
pub const REF_ALIASES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "@" => "HEAD",
};

pub const HEAD_REF_NAME: &str = "HEAD";
pub const REFS_PREFIX: &str = "refs/";
pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";

/// Suffix of an advertised line carrying the peeled target of the previous tag
pub const PEELED_SUFFIX: &str = "^{}";
