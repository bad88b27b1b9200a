//! # Caller Roles
//!
//! The gateway distinguishes two roles. Privilege is a total order so
//! authorization checks are a single comparison, never a string match.

use serde::{Deserialize, Serialize};

/// The role attached to a gateway user.
///
/// The derived `Ord` gives the privilege order `Member < Admin`, which is
/// what `require_role`-style checks compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Submits commands and votes on pending approvals.
    Member,
    /// Manages rules, users, and credits; approves or rejects pending
    /// commands.
    Admin,
}

impl Role {
    /// Stable string form used in audit details and auth headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }

    /// Parse the stable string form. Returns `None` for unknown input.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Role::Member),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
