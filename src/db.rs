//! SQLite connection setup, schema bootstrap and first-boot provisioning.

use crate::services::password::hash_password;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{
    SqlitePool, Transaction,
    sqlite::{Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{path::Path, str::FromStr, time::Duration};
use uuid::Uuid;

/// Schema applied at startup. Every statement is idempotent.
const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Username of the account provisioned on first boot.
pub const ROOT_USERNAME: &str = "root";

/// Open a pool for `database_url`, creating the database file (and its parent
/// directory) if needed.
///
/// In-memory databases are private to a connection, so they always get a
/// single connection that is never recycled.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:");

    if !in_memory {
        // Extract the local file path SQLx will use
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:")
            .trim_start_matches("file:");
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        tracing::debug!("Interpreted SQLite path => {}", db_path);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
    }

    let mut options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database url `{}`", database_url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", database_url))
}

/// Open a transaction that holds the write lock from its first statement.
///
/// A deferred `BEGIN` that reads before writing cannot wait for a concurrent
/// writer and fails with `SQLITE_BUSY`. `BEGIN IMMEDIATE` queues on the busy
/// timeout instead.
pub async fn begin_write(db: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    db.begin_with("BEGIN IMMEDIATE").await
}

/// Run the embedded schema statement by statement.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt)
            .execute(db)
            .await
            .with_context(|| format!("executing migration statement `{}`", stmt))?;
    }

    Ok(())
}

/// Provision the `root` account when no active root user exists.
///
/// Returns true if an account was created.
pub async fn bootstrap_root(db: &SqlitePool, default_password: &str) -> Result<bool> {
    let roots: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM users WHERE is_root = 1 AND deleted_at IS NULL",
    )
    .fetch_one(db)
    .await?;
    if roots > 0 {
        return Ok(false);
    }

    let password_hash = hash_password(default_password).context("hashing root password")?;
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, username, password_hash, is_root, status, created_at, updated_at)
         VALUES (?, ?, ?, 1, 'active', ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(ROOT_USERNAME)
    .bind(&password_hash)
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .context("creating root user")?;

    tracing::warn!(
        "Provisioned `{}` account from the configured password; rotate it immediately",
        ROOT_USERNAME
    );
    Ok(true)
}
