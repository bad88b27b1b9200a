//! # Gateway Users

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cmdgw_core::{Role, UserId};

/// A registered gateway user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Authorization role.
    pub role: Role,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

/// A user joined with their current credit balance, for admin listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserWithBalance {
    /// The user record.
    #[serde(flatten)]
    pub user: User,
    /// Current ledger balance; 0 when no ledger entry exists yet.
    pub balance: i64,
}
