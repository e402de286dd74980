//! Bucket-scoped authorization.
//!
//! A (bucket, user) pair has at most one live permission row; the oldest
//! unexpired row is authoritative. Root actors pass every check.
//!
//! Both functions take a plain connection so callers can run the check on the
//! same transaction as the mutation it guards.

use super::error::{ServiceError, ServiceResult};
use crate::models::{
    actor::Actor,
    bucket::{AccessLevel, BucketPermission},
};
use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

/// Return the active permission row for `(bucket_id, user_id)`.
///
/// Rows whose `expires_at` has passed are treated as absent.
pub async fn resolve(
    conn: &mut SqliteConnection,
    bucket_id: Uuid,
    user_id: Uuid,
) -> ServiceResult<BucketPermission> {
    sqlx::query_as::<_, BucketPermission>(
        "SELECT id, bucket_id, user_id, access, expires_at, created_at
         FROM bucket_permissions
         WHERE bucket_id = ? AND user_id = ?
           AND (expires_at IS NULL OR expires_at > ?)
         ORDER BY created_at ASC, id ASC
         LIMIT 1",
    )
    .bind(bucket_id)
    .bind(user_id)
    .bind(Utc::now())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("permission not found".into()))
}

/// Succeed if `actor` holds at least `required` on the bucket.
pub async fn authorize(
    conn: &mut SqliteConnection,
    actor: &Actor,
    bucket_id: Uuid,
    required: AccessLevel,
) -> ServiceResult<()> {
    if actor.is_root {
        return Ok(());
    }

    match resolve(conn, bucket_id, actor.user_id).await {
        Ok(perm) if perm.access.satisfies(required) => Ok(()),
        Ok(perm) => Err(ServiceError::Denied(format!(
            "permission denied: requires {} access, caller holds {}",
            required, perm.access
        ))),
        Err(ServiceError::NotFound(_)) => Err(ServiceError::Denied(
            "permission denied: no access to bucket".into(),
        )),
        Err(err) => Err(err),
    }
}
