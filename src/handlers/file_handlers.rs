//! File record endpoints and signed URL issuance.

use crate::{
    errors::AppError,
    models::{
        actor::Actor,
        file::{File, FilePatch, NewFileRecord, SignedUrl},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// `POST /api/v1/files` creates a record without content.
pub async fn create_file(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<NewFileRecord>,
) -> Result<impl IntoResponse, AppError> {
    let file = state.files.create_file_record(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(file)))
}

/// `GET /api/v1/files/{id}`
pub async fn get_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<File>, AppError> {
    Ok(Json(state.files.get_file(&actor, id).await?))
}

/// `PUT /api/v1/files/{id}`
pub async fn update_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<FilePatch>,
) -> Result<Json<File>, AppError> {
    Ok(Json(state.files.update_file(&actor, id, patch).await?))
}

/// `DELETE /api/v1/files/{id}`
pub async fn delete_file(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.files.delete_file(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/files/{id}/upload-url`
pub async fn get_upload_url(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<SignedUrl>, AppError> {
    Ok(Json(state.files.get_upload_url(&actor, id).await?))
}

/// `GET /api/v1/files/{id}/download-url`
pub async fn get_download_url(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<SignedUrl>, AppError> {
    Ok(Json(state.files.get_download_url(&actor, id).await?))
}
