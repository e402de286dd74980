//! Redemption of signed URLs. These routes carry no session token; the
//! signature in the query string is the credential.

use crate::{
    errors::AppError,
    models::file::File,
    services::url_signer::SignedParams,
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use uuid::Uuid;

/// `GET /api/v1/blobs/{id}?op=download&uid=&expires=&signature=`
pub async fn download_blob(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SignedParams>,
) -> Result<Response, AppError> {
    let (file, bytes) = state.files.read_signed(id, &params).await?;
    let length = bytes.len();

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    set_file_headers(response.headers_mut(), &file, length);
    Ok(response)
}

/// `PUT /api/v1/blobs/{id}?op=upload&uid=&expires=&signature=`
///
/// The raw request body becomes the file's content.
pub async fn upload_blob(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SignedParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<File>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let file = state
        .files
        .write_signed(id, &params, content_type, body)
        .await?;
    Ok(Json(file))
}

fn set_file_headers(headers: &mut HeaderMap, file: &File, length: usize) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    if let Some(hash) = file.hash.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", hash)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&file.last_modified.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.name.replace(['"', '\\'], "_")
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
}
