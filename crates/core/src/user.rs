//! User identity model shared by client and server.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::id::{DepartmentId, UserId};

/// RBAC role.
///
/// Roles are a closed enumeration: permissions derive from the role, not from
/// per-user grants, so adding a role is a code change by design.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    DepartmentAdmin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::DepartmentAdmin => "department_admin",
            Role::User => "user",
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "department_admin" => Ok(Role::DepartmentAdmin),
            "user" => Ok(Role::User),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// Cached/resolved user profile.
///
/// On the server this is the account record the verification gate resolves a
/// token subject to. On the client it is the profile cached alongside the
/// token so other contexts can adopt a session without a network round trip.
///
/// Accounts are never physically deleted out of a live session; logout only
/// clears the session's reference to the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// Convenience constructor for a fresh active account.
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username: username.into(),
            role,
            department_id: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }
}
