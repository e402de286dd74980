//! src/services/bucket_service.rs
//!
//! BucketService owns bucket lifecycle and the per-user permission rows
//! attached to each bucket. Every mutation runs its permission check on the
//! same transaction as the writes it guards.

use super::{
    error::{ServiceError, ServiceResult, conflict_on_unique},
    permission_service::authorize,
};
use crate::{
    db,
    models::{
        actor::Actor,
        bucket::{AccessLevel, Bucket, BucketPatch, BucketPermission, BucketStats, NewBucket, PermissionGrant},
        page::Pagination,
    },
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, sqlite::Sqlite};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info};
use uuid::Uuid;

pub const BUCKET_NAME_PREFIX: &str = "pfss-";
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const DESCRIPTION_MAX_LEN: usize = 255;

const BUCKET_COLUMNS: &str = "b.id, b.name, b.owner_id, b.description, b.created_at, b.updated_at";

#[derive(Clone)]
pub struct BucketService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl BucketService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create a bucket owned by `owner_id`.
    ///
    /// The bucket row and the owner's admin permission are inserted in one
    /// transaction. A name already used by a live bucket is a `Conflict`.
    pub async fn create_bucket(&self, req: NewBucket, owner_id: Uuid) -> ServiceResult<Bucket> {
        ensure_bucket_name_safe(&req.name)?;
        let description = req.description.unwrap_or_default();
        ensure_description_valid(&description)?;

        let now = Utc::now();
        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: req.name,
            owner_id,
            description,
            created_at: now,
            updated_at: now,
        };

        let mut tx = db::begin_write(&self.db).await?;

        let owner_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ? AND deleted_at IS NULL)",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;
        if !owner_exists {
            return Err(ServiceError::NotFound("owner not found".into()));
        }

        sqlx::query(
            "INSERT INTO buckets (id, name, owner_id, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(bucket.owner_id)
        .bind(&bucket.description)
        .bind(bucket.created_at)
        .bind(bucket.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            conflict_on_unique(err, || format!("bucket `{}` already exists", bucket.name))
        })?;

        insert_permission(&mut tx, bucket.id, owner_id, AccessLevel::Admin, None, now).await?;

        tx.commit().await?;
        info!("created bucket {} ({}) for {}", bucket.name, bucket.id, owner_id);
        Ok(bucket)
    }

    /// List the buckets visible to `actor` and the total visible count.
    ///
    /// Root sees every live bucket. Anyone else sees only buckets where they
    /// hold an unexpired permission row.
    pub async fn list_buckets(
        &self,
        actor: &Actor,
        page: Pagination,
    ) -> ServiceResult<(Vec<Bucket>, i64)> {
        let now = Utc::now();
        let mut conn = self.db.acquire().await?;

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM buckets b WHERE ");
        push_visible(&mut count, actor, now);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM buckets b WHERE ",
            BUCKET_COLUMNS
        ));
        push_visible(&mut select, actor, now);
        select.push(" ORDER BY b.created_at ASC, b.id ASC LIMIT ");
        select.push_bind(page.page_size);
        select.push(" OFFSET ");
        select.push_bind(page.offset());

        let buckets: Vec<Bucket> = select.build_query_as().fetch_all(&mut *conn).await?;
        Ok((buckets, total))
    }

    /// Fetch one bucket under the same visibility rule as listing.
    ///
    /// A bucket that does not exist and one the actor cannot see produce the
    /// same error.
    pub async fn get_bucket(&self, actor: &Actor, id: Uuid) -> ServiceResult<Bucket> {
        let mut select = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM buckets b WHERE b.id = ",
            BUCKET_COLUMNS
        ));
        select.push_bind(id);
        select.push(" AND ");
        push_visible(&mut select, actor, Utc::now());

        select
            .build_query_as::<Bucket>()
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("bucket not found or access denied".into()))
    }

    /// Rename a bucket or change its description. Requires admin.
    pub async fn update_bucket(
        &self,
        actor: &Actor,
        id: Uuid,
        patch: BucketPatch,
    ) -> ServiceResult<Bucket> {
        let mut tx = db::begin_write(&self.db).await?;
        authorize(&mut tx, actor, id, AccessLevel::Admin).await?;
        let mut bucket = fetch_active_bucket(&mut tx, id).await?;

        if let Some(name) = patch.name {
            if name != bucket.name {
                ensure_bucket_name_safe(&name)?;
                if name_taken(&mut tx, &name, id).await? {
                    return Err(ServiceError::Conflict(format!(
                        "bucket `{}` already exists",
                        name
                    )));
                }
                bucket.name = name;
            }
        }
        if let Some(description) = patch.description {
            ensure_description_valid(&description)?;
            bucket.description = description;
        }
        bucket.updated_at = Utc::now();

        sqlx::query("UPDATE buckets SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(&bucket.name)
            .bind(&bucket.description)
            .bind(bucket.updated_at)
            .bind(bucket.id)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                conflict_on_unique(err, || format!("bucket `{}` already exists", bucket.name))
            })?;

        tx.commit().await?;
        debug!("updated bucket {}", bucket.id);
        Ok(bucket)
    }

    /// Soft-delete a bucket and drop all of its permission rows. Requires admin.
    ///
    /// Buckets that still hold live files are rejected with `Conflict`.
    pub async fn delete_bucket(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        let mut tx = db::begin_write(&self.db).await?;
        authorize(&mut tx, actor, id, AccessLevel::Admin).await?;
        let bucket = fetch_active_bucket(&mut tx, id).await?;

        let files: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE bucket_id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        if files > 0 {
            return Err(ServiceError::Conflict(format!(
                "bucket `{}` is not empty ({} files)",
                bucket.name, files
            )));
        }

        sqlx::query("DELETE FROM bucket_permissions WHERE bucket_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        sqlx::query("UPDATE buckets SET deleted_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("deleted bucket {} ({})", bucket.name, bucket.id);
        Ok(())
    }

    /// Unexpired permission rows of a bucket. Requires admin.
    pub async fn list_permissions(
        &self,
        actor: &Actor,
        bucket_id: Uuid,
    ) -> ServiceResult<Vec<BucketPermission>> {
        let mut conn = self.db.acquire().await?;
        authorize(&mut conn, actor, bucket_id, AccessLevel::Admin).await?;
        fetch_active_bucket(&mut conn, bucket_id).await?;
        active_permissions(&mut conn, bucket_id).await
    }

    /// Replace every permission on the bucket except the acting user's own.
    /// Requires admin.
    ///
    /// Grants that target the actor are skipped. Grants must name distinct,
    /// existing users. Returns the resulting permission list.
    pub async fn update_permissions(
        &self,
        actor: &Actor,
        bucket_id: Uuid,
        grants: Vec<PermissionGrant>,
    ) -> ServiceResult<Vec<BucketPermission>> {
        let now = Utc::now();
        let grants: Vec<PermissionGrant> = grants
            .into_iter()
            .filter(|grant| grant.user_id != actor.user_id)
            .collect();

        let mut seen = HashSet::new();
        for grant in &grants {
            if !seen.insert(grant.user_id) {
                return Err(ServiceError::InvalidInput(format!(
                    "duplicate grant for user {}",
                    grant.user_id
                )));
            }
            if grant.is_expired_at(now) {
                return Err(ServiceError::InvalidInput(format!(
                    "grant for user {} is already expired",
                    grant.user_id
                )));
            }
        }

        let mut tx = db::begin_write(&self.db).await?;
        authorize(&mut tx, actor, bucket_id, AccessLevel::Admin).await?;
        fetch_active_bucket(&mut tx, bucket_id).await?;

        for grant in &grants {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ? AND deleted_at IS NULL)",
            )
            .bind(grant.user_id)
            .fetch_one(&mut *tx)
            .await?;
            if !exists {
                return Err(ServiceError::InvalidInput(format!(
                    "unknown user {}",
                    grant.user_id
                )));
            }
        }

        sqlx::query("DELETE FROM bucket_permissions WHERE bucket_id = ? AND user_id != ?")
            .bind(bucket_id)
            .bind(actor.user_id)
            .execute(&mut *tx)
            .await?;

        for grant in &grants {
            insert_permission(&mut tx, bucket_id, grant.user_id, grant.access, grant.expires_at, now)
                .await?;
        }

        let permissions = active_permissions(&mut tx, bucket_id).await?;
        tx.commit().await?;
        info!(
            "replaced permissions on bucket {} with {} grants",
            bucket_id,
            grants.len()
        );
        Ok(permissions)
    }

    /// File count and total size of the live files in a bucket. Requires read.
    pub async fn get_stats(&self, actor: &Actor, bucket_id: Uuid) -> ServiceResult<BucketStats> {
        let mut conn = self.db.acquire().await?;
        authorize(&mut conn, actor, bucket_id, AccessLevel::Read).await?;
        fetch_active_bucket(&mut conn, bucket_id).await?;

        let (file_count, total_size): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size), 0)
             FROM files WHERE bucket_id = ? AND deleted_at IS NULL",
        )
        .bind(bucket_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(BucketStats {
            file_count,
            total_size,
        })
    }
}

/// Fetch a live bucket by id.
pub(crate) async fn fetch_active_bucket(
    conn: &mut SqliteConnection,
    id: Uuid,
) -> ServiceResult<Bucket> {
    sqlx::query_as::<_, Bucket>(&format!(
        "SELECT {} FROM buckets b WHERE b.id = ? AND b.deleted_at IS NULL",
        BUCKET_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("bucket not found".into()))
}

/// Validate bucket name format.
///
/// Names are 3 to 63 characters, start with the reserved `pfss-` prefix and
/// use lowercase letters, digits, dots and hyphens. They double as on-disk
/// directory names, so they may not end with a dot or hyphen or contain `..`.
pub fn ensure_bucket_name_safe(name: &str) -> ServiceResult<()> {
    let invalid = |reason: &str| {
        Err(ServiceError::InvalidInput(format!(
            "invalid bucket name `{}`: {}",
            name, reason
        )))
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return invalid("must be between 3 and 63 characters");
    }
    if !name.starts_with(BUCKET_NAME_PREFIX) {
        return invalid("must start with `pfss-`");
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
    }
    if name.ends_with('.') || name.ends_with('-') {
        return invalid("must end with a lowercase letter or digit");
    }
    if name.contains("..") {
        return invalid("cannot contain consecutive dots");
    }
    Ok(())
}

fn ensure_description_valid(description: &str) -> ServiceResult<()> {
    if description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(ServiceError::InvalidInput(
            "description must be at most 255 characters".into(),
        ));
    }
    Ok(())
}

/// Append the visibility predicate for `actor` over the `b` alias.
fn push_visible(builder: &mut QueryBuilder<'_, Sqlite>, actor: &Actor, now: DateTime<Utc>) {
    builder.push("b.deleted_at IS NULL");
    if actor.is_root {
        return;
    }
    builder.push(
        " AND EXISTS (SELECT 1 FROM bucket_permissions p WHERE p.bucket_id = b.id AND p.user_id = ",
    );
    builder.push_bind(actor.user_id);
    builder.push(" AND (p.expires_at IS NULL OR p.expires_at > ");
    builder.push_bind(now);
    builder.push("))");
}

async fn name_taken(conn: &mut SqliteConnection, name: &str, except: Uuid) -> ServiceResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM buckets WHERE name = ? AND deleted_at IS NULL AND id IS NOT ?)",
    )
    .bind(name)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

async fn insert_permission(
    conn: &mut SqliteConnection,
    bucket_id: Uuid,
    user_id: Uuid,
    access: AccessLevel,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO bucket_permissions (id, bucket_id, user_id, access, expires_at, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(bucket_id)
    .bind(user_id)
    .bind(access)
    .bind(expires_at)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn active_permissions(
    conn: &mut SqliteConnection,
    bucket_id: Uuid,
) -> ServiceResult<Vec<BucketPermission>> {
    let permissions = sqlx::query_as::<_, BucketPermission>(
        "SELECT id, bucket_id, user_id, access, expires_at, created_at
         FROM bucket_permissions
         WHERE bucket_id = ? AND (expires_at IS NULL OR expires_at > ?)
         ORDER BY created_at ASC, id ASC",
    )
    .bind(bucket_id)
    .bind(Utc::now())
    .fetch_all(&mut *conn)
    .await?;
    Ok(permissions)
}
