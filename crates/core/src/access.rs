//! Access levels for projects and teams.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A user's access level on a project or team.
///
/// Levels are totally ordered; each level implies every level below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    None,
    Read,
    Write,
    Manage,
    Owner,
}

impl AccessLevel {
    /// Numeric code stored in the permission tables.
    pub fn code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Read => 1,
            Self::Write => 2,
            Self::Manage => 3,
            Self::Owner => 4,
        }
    }

    /// Convert a stored code. Codes below zero map to `None` and codes above
    /// the highest level map to `Owner`.
    pub fn from_code(code: i32) -> Self {
        match code {
            i32::MIN..=0 => Self::None,
            1 => Self::Read,
            2 => Self::Write,
            3 => Self::Manage,
            _ => Self::Owner,
        }
    }

    /// Project level implied by a permission on the project's owning team.
    ///
    /// Team writers manage every project of the team; team readers can read.
    pub fn from_team_level(team: AccessLevel) -> Self {
        if team >= Self::Write {
            Self::Manage
        } else {
            team
        }
    }

    pub fn can_read(self) -> bool {
        self >= Self::Read
    }

    pub fn can_write(self) -> bool {
        self >= Self::Write
    }

    pub fn can_manage(self) -> bool {
        self >= Self::Manage
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::Manage => "manage",
            Self::Owner => "owner",
        };
        f.write_str(s)
    }
}
