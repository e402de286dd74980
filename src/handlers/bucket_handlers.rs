//! Bucket endpoints, including the listing and multipart upload of the
//! files inside a bucket.

use crate::{
    errors::AppError,
    models::{
        actor::Actor,
        bucket::{Bucket, BucketPatch, BucketPermission, BucketStats, NewBucket, PermissionGrant},
        file::{File, UploadedBlob},
        page::{Page, PageQuery, Pagination},
    },
    services::error::ServiceError,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

/// A bucket plus its permission list when the caller administers it.
#[derive(Serialize)]
pub struct BucketDetail {
    #[serde(flatten)]
    pub bucket: Bucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<BucketPermission>>,
}

/// `POST /api/v1/buckets`
pub async fn create_bucket(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<NewBucket>,
) -> Result<impl IntoResponse, AppError> {
    let bucket = state.buckets.create_bucket(req, actor.user_id).await?;
    Ok((StatusCode::CREATED, Json(bucket)))
}

/// `GET /api/v1/buckets`
pub async fn list_buckets(
    State(state): State<AppState>,
    actor: Actor,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<Bucket>>, AppError> {
    let page = Pagination::from(q);
    let (buckets, total) = state.buckets.list_buckets(&actor, page).await?;
    Ok(Json(Page::new(buckets, total, page)))
}

/// `GET /api/v1/buckets/{id}`
pub async fn get_bucket(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BucketDetail>, AppError> {
    let bucket = state.buckets.get_bucket(&actor, id).await?;
    let permissions = match state.buckets.list_permissions(&actor, id).await {
        Ok(permissions) => Some(permissions),
        Err(ServiceError::Denied(_)) => None,
        Err(err) => return Err(err.into()),
    };
    Ok(Json(BucketDetail {
        bucket,
        permissions,
    }))
}

/// `PUT /api/v1/buckets/{id}`
pub async fn update_bucket(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<BucketPatch>,
) -> Result<Json<Bucket>, AppError> {
    Ok(Json(state.buckets.update_bucket(&actor, id, patch).await?))
}

/// `DELETE /api/v1/buckets/{id}`
pub async fn delete_bucket(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.buckets.delete_bucket(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/buckets/{id}/permissions`
pub async fn list_permissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<BucketPermission>>, AppError> {
    Ok(Json(state.buckets.list_permissions(&actor, id).await?))
}

/// `PUT /api/v1/buckets/{id}/permissions`
pub async fn update_permissions(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(grants): Json<Vec<PermissionGrant>>,
) -> Result<Json<Vec<BucketPermission>>, AppError> {
    Ok(Json(
        state
            .buckets
            .update_permissions(&actor, id, grants)
            .await?,
    ))
}

/// `GET /api/v1/buckets/{id}/stats`
pub async fn get_stats(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<BucketStats>, AppError> {
    Ok(Json(state.buckets.get_stats(&actor, id).await?))
}

/// `GET /api/v1/buckets/{id}/files`
pub async fn list_files(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Query(q): Query<PageQuery>,
) -> Result<Json<Page<File>>, AppError> {
    let page = Pagination::from(q);
    let (files, total) = state.files.list_files(&actor, id, page).await?;
    Ok(Json(Page::new(files, total, page)))
}

/// `POST /api/v1/buckets/{id}/files`
///
/// Multipart form with a `file` part and an optional `path` text part.
pub async fn upload_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut blob = None;
    let mut path = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::new(err.status(), err.body_text()))?;
                blob = Some(UploadedBlob {
                    filename,
                    content_type,
                    bytes,
                });
            }
            Some("path") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::new(err.status(), err.body_text()))?;
                if !text.is_empty() {
                    path = Some(text);
                }
            }
            _ => {}
        }
    }

    let blob = blob.ok_or_else(|| AppError::bad_request("missing `file` part"))?;
    let file = state.files.upload_file(&actor, id, blob, path).await?;
    Ok((StatusCode::CREATED, Json(file)))
}
