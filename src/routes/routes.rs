//! Defines every HTTP route of the service.
//!
//! ## Structure
//! - **Health** (mounted at root): `GET /healthz`, `GET /readyz`
//! - **Auth** under `/api/v1/auth`: register, login, password change
//! - **Users** under `/api/v1/users`: listing, profile edits, status and
//!   capability grants
//! - **Buckets** under `/api/v1/buckets`: lifecycle, permissions, stats,
//!   and the files inside a bucket (listing, multipart upload)
//! - **Files** under `/api/v1/files`: records and signed URL issuance
//! - **Blobs** under `/api/v1/blobs/{id}`: signed URL redemption

use crate::{
    handlers::{
        auth_handlers::{change_password, login, register},
        blob_handlers::{download_blob, upload_blob},
        bucket_handlers::{
            create_bucket, delete_bucket, get_bucket, get_stats, list_buckets, list_files,
            list_permissions, update_bucket, update_permissions, upload_file,
        },
        file_handlers::{
            create_file, delete_file, get_download_url, get_file, get_upload_url, update_file,
        },
        health_handlers::{healthz, readyz},
        user_handlers::{
            current_user, delete_user, get_user, get_user_permissions, list_users,
            update_user, update_user_permissions, update_user_status,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Build the router for the whole service.
///
/// `max_upload_bytes` caps every request body, including multipart uploads
/// and signed URL uploads.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/password", put(change_password))
        .route("/users", get(list_users))
        .route("/users/me", get(current_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/users/{id}/status", put(update_user_status))
        .route(
            "/users/{id}/permissions",
            get(get_user_permissions).put(update_user_permissions),
        )
        .route("/buckets", get(list_buckets).post(create_bucket))
        .route(
            "/buckets/{id}",
            get(get_bucket).put(update_bucket).delete(delete_bucket),
        )
        .route(
            "/buckets/{id}/permissions",
            get(list_permissions).put(update_permissions),
        )
        .route("/buckets/{id}/stats", get(get_stats))
        .route("/buckets/{id}/files", get(list_files).post(upload_file))
        .route("/files", post(create_file))
        .route("/files/{id}", get(get_file).put(update_file).delete(delete_file))
        .route("/files/{id}/upload-url", get(get_upload_url))
        .route("/files/{id}/download-url", get(get_download_url))
        .route("/blobs/{id}", get(download_blob).put(upload_blob));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
