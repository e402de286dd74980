//! User management endpoints.

use crate::{
    errors::AppError,
    models::{
        actor::Actor,
        page::{Page, PageQuery, Pagination},
        user::{StatusChange, User, UserPatch, UserPermission, UserPermissionGrant},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

/// `GET /api/v1/users`
pub async fn list_users(
    State(state): State<AppState>,
    _actor: Actor,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<User>>, AppError> {
    let page = Pagination::from(q);
    let (users, total) = state.users.list_users(page).await?;
    Ok(Json(Page::new(users, total, page)))
}

/// `GET /api/v1/users/me`
pub async fn current_user(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.get_user(actor.user_id).await?))
}

/// `GET /api/v1/users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.get_user(id).await?))
}

/// `PUT /api/v1/users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.users.update_user(&actor, id, patch).await?))
}

/// `DELETE /api/v1/users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.users.delete_user(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/v1/users/{id}/status`
pub async fn update_user_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(change): Json<StatusChange>,
) -> Result<Json<User>, AppError> {
    Ok(Json(
        state
            .users
            .update_user_status(&actor, id, change.status)
            .await?,
    ))
}

/// `GET /api/v1/users/{id}/permissions`
pub async fn get_user_permissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<UserPermission>>, AppError> {
    Ok(Json(state.users.get_user_permissions(&actor, id).await?))
}

/// `PUT /api/v1/users/{id}/permissions`
pub async fn update_user_permissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(grants): Json<Vec<UserPermissionGrant>>,
) -> Result<Json<Vec<UserPermission>>, AppError> {
    Ok(Json(
        state
            .users
            .update_user_permissions(&actor, id, grants)
            .await?,
    ))
}
