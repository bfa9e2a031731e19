use crate::artifacts::core::error::GitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Blob => "blob",
            ObjectType::Tree => "tree",
            ObjectType::Commit => "commit",
            ObjectType::Tag => "tag",
        }
    }

    /// Parse a loose object header `"<kind> <len>\0"`
    ///
    /// Returns the kind, the declared payload length, and the header length
    /// (including the NUL) so the caller can slice the payload.
    pub fn parse_header(data: &[u8]) -> anyhow::Result<(ObjectType, usize, usize)> {
        let nul = data
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| GitError::format("object header is missing its NUL terminator"))?;
        let header = std::str::from_utf8(&data[..nul])
            .map_err(|_| GitError::format("object header is not valid UTF-8"))?;

        let (kind, size) = header
            .split_once(' ')
            .ok_or_else(|| GitError::format(format!("malformed object header: {header:?}")))?;
        let object_type = ObjectType::try_from(kind)?;
        let size = size
            .parse::<usize>()
            .map_err(|_| GitError::format(format!("invalid object size in header: {size:?}")))?;

        Ok((object_type, size, nul + 1))
    }

    /// Pack entry type code (3 bits) for the base object kinds
    pub fn pack_code(&self) -> u8 {
        match self {
            ObjectType::Commit => 1,
            ObjectType::Tree => 2,
            ObjectType::Blob => 3,
            ObjectType::Tag => 4,
        }
    }
}

impl TryFrom<&str> for ObjectType {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        match value {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => anyhow::bail!(GitError::format(format!("invalid object type: {value:?}"))),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
