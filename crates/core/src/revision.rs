//! File revisions and proposed changes.

use crate::block::FileHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a project-relative path.
pub const MAX_PATH_LEN: usize = 1024;

/// The kind of change a file revision introduces.
///
/// Stored as a small integer code in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl ChangeKind {
    /// Numeric code used in the catalog.
    pub fn code(self) -> i32 {
        match self {
            Self::Add => 1,
            Self::Modify => 2,
            Self::Delete => 3,
        }
    }

    /// Parse a numeric catalog code.
    pub fn from_code(code: i32) -> crate::Result<Self> {
        match code {
            1 => Ok(Self::Add),
            2 => Ok(Self::Modify),
            3 => Ok(Self::Delete),
            other => Err(crate::Error::InvalidChangeKind(other.to_string())),
        }
    }

    pub fn is_delete(self) -> bool {
        matches!(self, Self::Delete)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One entry of a proposed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub path: String,
    pub content_hash: FileHash,
    pub change_kind: ChangeKind,
}

/// Validate a project-relative path.
///
/// Paths use `/` separators, are relative, and may not contain empty, `.` or
/// `..` segments. Backslashes are rejected so the same file cannot be spelled
/// two ways.
pub fn validate_path(path: &str) -> crate::Result<()> {
    let invalid = |reason: &str| Err(crate::Error::InvalidPath(format!("{path:?}: {reason}")));

    if path.is_empty() {
        return invalid("empty");
    }
    if path.len() > MAX_PATH_LEN {
        return invalid("too long");
    }
    if path.starts_with('/') {
        return invalid("must be relative");
    }
    if path.contains('\\') || path.contains('\0') {
        return invalid("contains a forbidden character");
    }
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return invalid("contains an empty or relative segment");
        }
    }
    Ok(())
}
