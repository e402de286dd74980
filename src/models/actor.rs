//! The authenticated caller of an operation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity every manager call is performed on behalf of.
///
/// Built from a verified session token and the caller's current user record,
/// then passed explicitly into each service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// ID of the calling user.
    pub user_id: Uuid,

    /// Username at the time the actor was resolved.
    pub username: String,

    /// Root actors bypass every bucket-level permission check.
    pub is_root: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, username: impl Into<String>, is_root: bool) -> Self {
        Self {
            user_id,
            username: username.into(),
            is_root,
        }
    }
}
