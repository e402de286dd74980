//! Shared application state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        auth_service::AuthService, blob_store::LocalBlobStore, bucket_service::BucketService,
        file_service::FileService, token_service::TokenService, url_signer::UrlSigner,
        user_service::UserService,
    },
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    /// Root directory of the blob store, probed by the readiness check.
    pub storage_dir: PathBuf,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub users: UserService,
    pub buckets: BucketService,
    pub files: FileService,
}

impl AppState {
    /// Wire every service onto one pool and one local blob store.
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        let storage_dir = PathBuf::from(&cfg.storage_dir);
        let tokens = TokenService::new(&cfg.jwt_secret, Duration::hours(cfg.jwt_ttl_hours));
        let signer = UrlSigner::new(cfg.jwt_secret.as_bytes(), cfg.public_url.clone());
        let blobs = Arc::new(LocalBlobStore::new(storage_dir.clone()));

        Self {
            auth: AuthService::new(db.clone(), tokens.clone()),
            users: UserService::new(db.clone()),
            buckets: BucketService::new(db.clone()),
            files: FileService::new(db.clone(), blobs, signer),
            db,
            storage_dir,
            tokens,
        }
    }
}
