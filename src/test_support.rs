//! Fixtures shared by the unit tests.

use crate::{
    db,
    models::{
        actor::Actor,
        bucket::{AccessLevel, NewBucket},
    },
    services::bucket_service::BucketService,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// A fresh in-memory database with the schema applied.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    Arc::new(pool)
}

/// A WAL database file under `dir` with several pooled connections, for tests
/// where writers really race.
pub async fn file_pool(dir: &TempDir) -> Arc<SqlitePool> {
    let url = format!("sqlite://{}", dir.path().join("pfss.db").display());
    let pool = db::connect(&url, 5).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    Arc::new(pool)
}

/// Insert an active user directly. Its password hash is not a valid PHC
/// string, so it cannot log in.
pub async fn insert_user(pool: &SqlitePool, username: &str, is_root: bool) -> Actor {
    let id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, is_root, status, created_at, updated_at)
         VALUES (?, ?, 'x', ?, 'active', ?, ?)",
    )
    .bind(id)
    .bind(username)
    .bind(is_root)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    Actor::new(id, username, is_root)
}

/// Create a bucket through the service so the owner gets its admin row.
pub async fn insert_bucket(pool: &Arc<SqlitePool>, name: &str, owner: &Actor) -> Uuid {
    BucketService::new(pool.clone())
        .create_bucket(
            NewBucket {
                name: name.into(),
                description: None,
            },
            owner.user_id,
        )
        .await
        .unwrap()
        .id
}

pub async fn insert_permission(
    pool: &SqlitePool,
    bucket_id: Uuid,
    user_id: Uuid,
    access: AccessLevel,
    expires_at: Option<DateTime<Utc>>,
) {
    sqlx::query(
        "INSERT INTO bucket_permissions (id, bucket_id, user_id, access, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(bucket_id)
    .bind(user_id)
    .bind(access)
    .bind(expires_at)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

/// Make every insert into `table` fail, simulating a storage fault.
pub async fn fail_inserts_into(pool: &SqlitePool, table: &str) {
    let sql = format!(
        "CREATE TRIGGER fail_{table}_insert BEFORE INSERT ON {table}
         BEGIN SELECT RAISE(ABORT, 'injected fault'); END"
    );
    sqlx::query(&sql).execute(pool).await.unwrap();
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}
