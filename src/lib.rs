//! PFSS, a private file storage service.
//!
//! Users own buckets, grant each other read, write or admin access to them,
//! and store files inside. Metadata lives in SQLite and file content on the
//! local disk.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

use axum::Router;
use state::AppState;

/// The complete application with state attached.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    routes::routes::routes(max_upload_bytes).with_state(state)
}
