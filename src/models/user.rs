//! Represents user accounts and their coarse, system-wide capability grants.

use super::bucket::AccessLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account status. Inactive users cannot sign in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
}

/// A registered account.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct User {
    /// Unique identifier for this user.
    pub id: Uuid,

    /// Login name, unique among non-deleted users.
    pub username: String,

    /// Argon2 PHC string. Never serialized.
    #[serde(skip)]
    pub password_hash: String,

    /// Root users bypass bucket permission checks.
    pub is_root: bool,

    pub status: UserStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Partial update of a user. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub is_root: Option<bool>,
}

/// A global capability grant, independent of bucket permissions.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UserPermission {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Resource the capability covers (e.g. "buckets").
    pub resource: String,
    pub action: AccessLevel,
    pub created_at: DateTime<Utc>,
}

/// One entry of a capability replacement request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPermissionGrant {
    pub resource: String,
    pub action: AccessLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub is_root: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StatusChange {
    pub status: UserStatus,
}
