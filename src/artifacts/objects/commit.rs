//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Optional extra headers (`encoding`, `gpgsig`, `mergetag`, ...)
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//! gpgsig -----BEGIN PGP SIGNATURE-----
//!  <continuation lines start with a space>
//!
//! <commit message>
//! ```

use crate::artifacts::core::error::GitError;
use crate::artifacts::objects::object::Unpackable;
use crate::artifacts::objects::object::{Object, Packable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use std::io::BufRead;

/// UTC offset exactly as written in an identity line (`+0200`, `-0000`)
///
/// The sign is kept separately from the magnitude so `-0000` survives a round trip.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub struct TimeZoneOffset {
    negative: bool,
    minutes: u32,
}

impl TimeZoneOffset {
    pub fn new(negative: bool, minutes: u32) -> Self {
        TimeZoneOffset { negative, minutes }
    }

    pub fn utc() -> Self {
        TimeZoneOffset::default()
    }

    /// Signed offset from UTC in seconds
    pub fn seconds(&self) -> i32 {
        let seconds = (self.minutes * 60) as i32;
        if self.negative { -seconds } else { seconds }
    }

    pub fn to_fixed_offset(&self) -> Option<chrono::FixedOffset> {
        chrono::FixedOffset::east_opt(self.seconds())
    }
}

impl TryFrom<&str> for TimeZoneOffset {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        let bytes = value.as_bytes();
        if bytes.len() != 5
            || !matches!(bytes[0], b'+' | b'-')
            || !bytes[1..].iter().all(u8::is_ascii_digit)
        {
            anyhow::bail!(GitError::format(format!("invalid timezone offset {value:?}")));
        }

        let hours: u32 = value[1..3].parse()?;
        let minutes: u32 = value[3..5].parse()?;
        Ok(TimeZoneOffset::new(bytes[0] == b'-', hours * 60 + minutes))
    }
}

impl std::fmt::Display for TimeZoneOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{:02}{:02}",
            if self.negative { '-' } else { '+' },
            self.minutes / 60,
            self.minutes % 60
        )
    }
}

/// Author, committer or tagger information
///
/// Contains name, email, and a timestamp with its timezone offset.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: String,
    email: String,
    timestamp: i64,
    offset: TimeZoneOffset,
}

impl Author {
    /// Create a new author with the current local time
    pub fn new(name: String, email: String) -> Self {
        let now = chrono::Local::now().fixed_offset();
        let offset_seconds = now.offset().local_minus_utc();
        Author {
            name,
            email,
            timestamp: now.timestamp(),
            offset: TimeZoneOffset::new(offset_seconds < 0, offset_seconds.unsigned_abs() / 60),
        }
    }

    /// Create a new author with a specific timestamp
    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: i64,
        offset: TimeZoneOffset,
    ) -> Self {
        Author {
            name,
            email,
            timestamp,
            offset,
        }
    }

    /// Format author name and email for display
    ///
    /// # Returns
    ///
    /// String in format "Name <email@example.com>"
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Identity line as stored: "Name <email> timestamp timezone"
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.offset
        )
    }

    /// Format timestamp in human-readable form
    ///
    /// # Returns
    ///
    /// String like "Mon Jan 1 12:34:56 2024 +0000"
    pub fn readable_timestamp(&self) -> String {
        let datetime = self.offset.to_fixed_offset().and_then(|offset| {
            chrono::DateTime::from_timestamp(self.timestamp, 0)
                .map(|datetime| datetime.with_timezone(&offset))
        });

        match datetime {
            Some(datetime) => datetime.format("%a %b %-d %H:%M:%S %Y %z").to_string(),
            None => format!("{} {}", self.timestamp, self.offset),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Seconds since the Unix epoch
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn offset(&self) -> TimeZoneOffset {
        self.offset
    }
}

impl TryFrom<&str> for Author {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Format: "name <email> timestamp timezone"
        let email_end = value
            .rfind('>')
            .ok_or_else(|| GitError::format(format!("invalid identity {value:?}: missing '>'")))?;
        let email_start = value[..email_end]
            .rfind('<')
            .ok_or_else(|| GitError::format(format!("invalid identity {value:?}: missing '<'")))?;

        let name = value[..email_start]
            .strip_suffix(' ')
            .unwrap_or(&value[..email_start])
            .to_string();
        let email = value[email_start + 1..email_end].to_string();

        let (timestamp, timezone) = value[email_end + 1..]
            .trim_start_matches(' ')
            .split_once(' ')
            .ok_or_else(|| GitError::format(format!("invalid identity {value:?}: missing date")))?;
        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| GitError::format(format!("invalid timestamp {timestamp:?}")))?;
        let offset = TimeZoneOffset::try_from(timezone)?;

        Ok(Author {
            name,
            email,
            timestamp,
            offset,
        })
    }
}

/// Header fields and message of a commit or tag payload
///
/// Continuation lines (leading space) are folded into the previous value with
/// `\n`, mirroring how they are written back.
pub(crate) fn split_headers(content: &str) -> anyhow::Result<(Vec<(String, String)>, String)> {
    let (header, message) = content
        .split_once("\n\n")
        .ok_or_else(|| GitError::format("missing blank line between headers and message"))?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in header.split('\n') {
        if let Some(continuation) = line.strip_prefix(' ') {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| GitError::format("continuation line without a header"))?;
            value.push('\n');
            value.push_str(continuation);
            continue;
        }

        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| GitError::format(format!("malformed header line {line:?}")))?;
        headers.push((key.to_string(), value.to_string()));
    }

    Ok((headers, message.to_string()))
}

pub(crate) fn write_header(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push(' ');
    out.push_str(&value.replace('\n', "\n "));
    out.push('\n');
}

pub(crate) fn read_utf8(mut reader: impl BufRead, kind: &str) -> anyhow::Result<String> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    String::from_utf8(content)
        .map_err(|_| GitError::format(format!("{kind} object is not valid UTF-8")).into())
}

/// Git commit object
///
/// Represents a snapshot of the repository with metadata.
/// Contains references to:
/// - The tree representing the state of files
/// - Parent commit(s) for history
/// - Author and committer information
/// - Commit message
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit IDs (empty for root commits, multiple for merge commits)
    parents: Vec<ObjectId>,
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    /// Author who wrote the changes
    author: Author,
    /// Committer who recorded the commit
    committer: Author,
    /// Headers after `committer`, in stored order
    extra_headers: Vec<(String, String)>,
    /// Commit message, byte-exact (including its trailing newline, if any)
    message: String,
}

impl Commit {
    /// Create a new commit
    ///
    /// The author is also used as committer.
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Author,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author: author.clone(),
            committer: author,
            extra_headers: Vec::new(),
            message,
        }
    }

    pub fn with_committer(mut self, committer: Author) -> Self {
        self.committer = committer;
        self
    }

    pub fn with_extra_header(mut self, key: &str, value: &str) -> Self {
        self.extra_headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Get the first line of the commit message
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    pub fn extra_headers(&self) -> &[(String, String)] {
        &self.extra_headers
    }

    /// Committer timestamp, which orders history walks
    pub fn timestamp(&self) -> i64 {
        self.committer.timestamp()
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = String::new();

        write_header(&mut content, "tree", &self.tree_oid.to_hex());
        for parent in &self.parents {
            write_header(&mut content, "parent", &parent.to_hex());
        }
        write_header(&mut content, "author", &self.author.display());
        write_header(&mut content, "committer", &self.committer.display());
        for (key, value) in &self.extra_headers {
            write_header(&mut content, key, value);
        }
        content.push('\n');
        content.push_str(&self.message);

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Commit {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let content = read_utf8(reader, "commit")?;
        let (headers, message) = split_headers(&content)?;
        let mut headers = headers.into_iter().peekable();

        let tree_oid = match headers.next() {
            Some((key, value)) if key == "tree" => ObjectId::try_parse(value)?,
            _ => anyhow::bail!(GitError::format("invalid commit object: missing tree line")),
        };

        // there can be 0, 1, or multiple parents
        let mut parents = Vec::new();
        while let Some((_, value)) = headers.next_if(|(key, _)| key == "parent") {
            parents.push(ObjectId::try_parse(value)?);
        }

        let author = match headers.next() {
            Some((key, value)) if key == "author" => Author::try_from(value.as_str())?,
            _ => anyhow::bail!(GitError::format("invalid commit object: missing author line")),
        };

        let committer = match headers.next() {
            Some((key, value)) if key == "committer" => Author::try_from(value.as_str())?,
            _ => anyhow::bail!(GitError::format(
                "invalid commit object: missing committer line"
            )),
        };

        Ok(Commit {
            parents,
            tree_oid,
            author,
            committer,
            extra_headers: headers.collect(),
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        self.serialize()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }
}
