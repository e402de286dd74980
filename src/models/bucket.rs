//! Represents a logical bucket and the per-user permissions attached to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// A storage bucket: a named container for files.
///
/// Every bucket belongs to one owner, who receives an `admin` permission row
/// when the bucket is created.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Bucket {
    /// Unique identifier for this bucket.
    pub id: Uuid,

    /// Globally unique bucket name among non-deleted buckets.
    pub name: String,

    /// ID of the user that created this bucket.
    pub owner_id: Uuid,

    /// Free-form description (may be empty).
    pub description: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,

    /// When this bucket was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Access level granted on a bucket.
///
/// Levels are totally ordered: `Read < Write < Admin`. A higher level
/// satisfies every requirement at or below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    /// Returns true if holding `self` is enough for an operation that
    /// requires `required`.
    pub fn satisfies(self, required: AccessLevel) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessLevel::Read),
            "write" => Ok(AccessLevel::Write),
            "admin" => Ok(AccessLevel::Admin),
            other => Err(format!("unknown access level `{}`", other)),
        }
    }
}

/// A permission row linking a user to a bucket.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct BucketPermission {
    /// Unique identifier for this grant.
    pub id: Uuid,

    /// Bucket the grant applies to.
    pub bucket_id: Uuid,

    /// User receiving the grant.
    pub user_id: Uuid,

    /// Granted level.
    pub access: AccessLevel,

    /// Optional expiry. Expired grants are treated as absent.
    pub expires_at: Option<DateTime<Utc>>,

    /// When this grant was written.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBucket {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of a bucket. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One entry of a permission replacement request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionGrant {
    pub user_id: Uuid,
    pub access: AccessLevel,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PermissionGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Aggregate figures over the non-deleted files of a bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketStats {
    pub file_count: i64,
    /// Sum of file sizes, in bytes.
    pub total_size: i64,
}
