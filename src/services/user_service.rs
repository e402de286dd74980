//! User management and the coarse, system-wide capability grants.

use super::error::{ServiceError, ServiceResult, conflict_on_unique};
use crate::{
    db,
    models::{
        actor::Actor,
        page::Pagination,
        user::{User, UserPatch, UserPermission, UserPermissionGrant, UserStatus},
    },
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::{collections::HashSet, sync::Arc};
use tracing::info;
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str =
    "id, username, password_hash, is_root, status, created_at, updated_at";

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 50;
const RESOURCE_MAX_LEN: usize = 100;

#[derive(Clone)]
pub struct UserService {
    pub db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn list_users(&self, page: Pagination) -> ServiceResult<(Vec<User>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
            .fetch_one(&*self.db)
            .await?;

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE deleted_at IS NULL
             ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            USER_COLUMNS
        ))
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(&*self.db)
        .await?;

        Ok((users, total))
    }

    pub async fn get_user(&self, id: Uuid) -> ServiceResult<User> {
        let mut conn = self.db.acquire().await?;
        fetch_active_user(&mut conn, id).await
    }

    /// Root may edit anyone; other users may only change their own username.
    pub async fn update_user(&self, actor: &Actor, id: Uuid, patch: UserPatch) -> ServiceResult<User> {
        if !actor.is_root {
            if actor.user_id != id {
                return Err(ServiceError::Denied(
                    "permission denied: cannot modify another user".into(),
                ));
            }
            if patch.is_root.is_some() || patch.status.is_some() {
                return Err(ServiceError::Denied(
                    "permission denied: only root may change role or status".into(),
                ));
            }
        } else if actor.user_id == id
            && (patch.is_root == Some(false) || patch.status == Some(UserStatus::Inactive))
        {
            return Err(ServiceError::Denied(
                "root user cannot demote or deactivate themselves".into(),
            ));
        }

        let mut tx = db::begin_write(&self.db).await?;
        let mut user = fetch_active_user(&mut tx, id).await?;

        if let Some(username) = patch.username {
            if username != user.username {
                ensure_username_valid(&username)?;
                user.username = username;
            }
        }
        if let Some(status) = patch.status {
            user.status = status;
        }
        if let Some(is_root) = patch.is_root {
            user.is_root = is_root;
        }
        user.updated_at = Utc::now();

        sqlx::query(
            "UPDATE users SET username = ?, status = ?, is_root = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&user.username)
        .bind(user.status)
        .bind(user.is_root)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            conflict_on_unique(err, || format!("username `{}` is taken", user.username))
        })?;

        tx.commit().await?;
        info!("user {} updated by {}", id, actor.user_id);
        Ok(user)
    }

    /// Soft-delete an account.
    ///
    /// Root cannot delete itself. Everyone else can delete only themselves.
    pub async fn delete_user(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        if actor.is_root && actor.user_id == id {
            return Err(ServiceError::Denied("root user cannot delete themselves".into()));
        }
        if !actor.is_root && actor.user_id != id {
            return Err(ServiceError::Denied(
                "permission denied: cannot delete another user".into(),
            ));
        }

        let mut tx = db::begin_write(&self.db).await?;
        fetch_active_user(&mut tx, id).await?;
        let now = Utc::now();
        sqlx::query("UPDATE users SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("user {} deleted by {}", id, actor.user_id);
        Ok(())
    }

    /// Activate or deactivate an account. Root only, and never on itself.
    pub async fn update_user_status(
        &self,
        actor: &Actor,
        id: Uuid,
        status: UserStatus,
    ) -> ServiceResult<User> {
        if !actor.is_root {
            return Err(ServiceError::Denied(
                "permission denied: only root may change user status".into(),
            ));
        }
        if actor.user_id == id {
            return Err(ServiceError::Denied(
                "root user cannot change their own status".into(),
            ));
        }

        let mut tx = db::begin_write(&self.db).await?;
        let mut user = fetch_active_user(&mut tx, id).await?;
        user.status = status;
        user.updated_at = Utc::now();
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(user.status)
            .bind(user.updated_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("user {} is now {:?}", id, status);
        Ok(user)
    }

    /// Capability grants of a user. Visible to root and to the user.
    pub async fn get_user_permissions(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> ServiceResult<Vec<UserPermission>> {
        if !actor.is_root && actor.user_id != id {
            return Err(ServiceError::Denied(
                "permission denied: cannot view another user's permissions".into(),
            ));
        }
        let mut conn = self.db.acquire().await?;
        fetch_active_user(&mut conn, id).await?;
        user_permissions(&mut conn, id).await
    }

    /// Replace a user's capability grants. Root only.
    pub async fn update_user_permissions(
        &self,
        actor: &Actor,
        id: Uuid,
        grants: Vec<UserPermissionGrant>,
    ) -> ServiceResult<Vec<UserPermission>> {
        if !actor.is_root {
            return Err(ServiceError::Denied(
                "permission denied: only root may grant user permissions".into(),
            ));
        }

        let mut seen = HashSet::new();
        for grant in &grants {
            if grant.resource.is_empty() || grant.resource.len() > RESOURCE_MAX_LEN {
                return Err(ServiceError::InvalidInput(
                    "resource must be between 1 and 100 characters".into(),
                ));
            }
            if !seen.insert((grant.resource.as_str(), grant.action)) {
                return Err(ServiceError::InvalidInput(format!(
                    "duplicate grant {} on `{}`",
                    grant.action, grant.resource
                )));
            }
        }

        let mut tx = db::begin_write(&self.db).await?;
        fetch_active_user(&mut tx, id).await?;
        sqlx::query("DELETE FROM user_permissions WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        for grant in &grants {
            sqlx::query(
                "INSERT INTO user_permissions (id, user_id, resource, action, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(id)
            .bind(&grant.resource)
            .bind(grant.action)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let permissions = user_permissions(&mut tx, id).await?;
        tx.commit().await?;
        info!("replaced {} capability grants for user {}", permissions.len(), id);
        Ok(permissions)
    }

    /// Turn a verified token subject into an `Actor` using the current user
    /// record. Deleted and inactive users are rejected.
    pub async fn resolve_actor(&self, user_id: Uuid) -> ServiceResult<Actor> {
        let mut conn = self.db.acquire().await?;
        active_actor(&mut conn, user_id)
            .await?
            .ok_or_else(|| ServiceError::Unauthenticated("account is not active".into()))
    }
}

pub(crate) async fn fetch_active_user(conn: &mut SqliteConnection, id: Uuid) -> ServiceResult<User> {
    sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = ? AND deleted_at IS NULL",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("user not found".into()))
}

/// The actor for an active, non-deleted user, if there is one.
pub(crate) async fn active_actor(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> ServiceResult<Option<Actor>> {
    let row: Option<(String, bool)> = sqlx::query_as(
        "SELECT username, is_root FROM users
         WHERE id = ? AND deleted_at IS NULL AND status = 'active'",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|(username, is_root)| Actor::new(user_id, username, is_root)))
}

pub(crate) fn ensure_username_valid(username: &str) -> ServiceResult<()> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ServiceError::InvalidInput(
            "username must be between 3 and 50 characters".into(),
        ));
    }
    if username.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ServiceError::InvalidInput(
            "username must not contain whitespace or control characters".into(),
        ));
    }
    Ok(())
}

async fn user_permissions(
    conn: &mut SqliteConnection,
    user_id: Uuid,
) -> ServiceResult<Vec<UserPermission>> {
    let permissions = sqlx::query_as::<_, UserPermission>(
        "SELECT id, user_id, resource, action, created_at FROM user_permissions
         WHERE user_id = ? ORDER BY resource ASC, action ASC",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(permissions)
}
