//! src/services/file_service.rs
//!
//! FileService owns file records inside buckets. Metadata lives in SQLite,
//! content is delegated to a `BlobStore`. Each operation authorizes the actor
//! against the owning bucket before touching anything.

use super::{
    blob_store::BlobStore,
    bucket_service::fetch_active_bucket,
    error::{ServiceError, ServiceResult, conflict_on_unique},
    permission_service::authorize,
    url_signer::{DOWNLOAD_URL_TTL_SECS, SignedOp, SignedParams, UPLOAD_URL_TTL_SECS, UrlSigner},
    user_service::active_actor,
};
use crate::{
    db,
    models::{
        actor::Actor,
        bucket::AccessLevel,
        file::{File, FilePatch, NewFileRecord, SignedUrl, UploadedBlob},
        metadata::{FileMetadata, METADATA_KEY_MAX_LEN, METADATA_VALUE_MAX_LEN},
        page::Pagination,
    },
};
use bytes::Bytes;
use chrono::{Duration, Utc};
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool, Transaction, sqlite::Sqlite};
use std::{collections::HashMap, io, path::Path, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_FILE_PATH_LEN: usize = 1024;
const MAX_FILE_NAME_LEN: usize = 255;
const MAX_CONTENT_TYPE_LEN: usize = 100;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const FILE_COLUMNS: &str = "id, bucket_id, name, path, size, content_type, hash, storage_path, \
                            created_by, updated_by, last_modified, created_at, updated_at";

#[derive(Clone)]
pub struct FileService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Where file content is kept.
    pub blobs: Arc<dyn BlobStore>,

    pub signer: UrlSigner,
}

impl FileService {
    pub fn new(db: Arc<SqlitePool>, blobs: Arc<dyn BlobStore>, signer: UrlSigner) -> Self {
        Self { db, blobs, signer }
    }

    /// Create a metadata-only file record. Any permission on the bucket
    /// suffices.
    pub async fn create_file_record(&self, actor: &Actor, req: NewFileRecord) -> ServiceResult<File> {
        ensure_name_valid(&req.name)?;
        ensure_path_safe(&req.path)?;
        ensure_content_type_valid(&req.content_type)?;
        ensure_metadata_valid(&req.metadata)?;
        if req.size < 0 {
            return Err(ServiceError::InvalidInput("size must not be negative".into()));
        }

        let now = Utc::now();
        let file = File {
            id: Uuid::new_v4(),
            bucket_id: req.bucket_id,
            name: req.name,
            path: req.path,
            size: req.size,
            content_type: req.content_type,
            hash: None,
            storage_path: None,
            created_by: actor.user_id,
            updated_by: actor.user_id,
            last_modified: now,
            created_at: now,
            updated_at: now,
            metadata: req.metadata,
        };

        let mut tx = db::begin_write(&self.db).await?;
        authorize(&mut tx, actor, file.bucket_id, AccessLevel::Read).await?;
        fetch_active_bucket(&mut tx, file.bucket_id).await?;
        insert_file(&mut tx, &file).await?;
        tx.commit().await?;

        info!("created file record {} at {}", file.id, file.path);
        Ok(file)
    }

    /// Store `blob` in the bucket and record it. Requires write.
    ///
    /// The file lands at `path`, or at `/<filename>` when no path is given.
    /// If recording fails after the content was stored, the content is
    /// deleted again.
    pub async fn upload_file(
        &self,
        actor: &Actor,
        bucket_id: Uuid,
        blob: UploadedBlob,
        path: Option<String>,
    ) -> ServiceResult<File> {
        let name = Path::new(&blob.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        ensure_name_valid(&name)?;
        let path = path.unwrap_or_else(|| format!("/{}", name));
        ensure_path_safe(&path)?;
        let content_type = blob
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        ensure_content_type_valid(&content_type)?;

        let mut tx = db::begin_write(&self.db).await?;
        authorize(&mut tx, actor, bucket_id, AccessLevel::Write).await?;
        let bucket = fetch_active_bucket(&mut tx, bucket_id).await?;
        if path_taken(&mut tx, bucket_id, &path, None).await? {
            return Err(path_conflict(&path));
        }

        let now = Utc::now();
        let size = blob.bytes.len() as i64;
        let hash = format!("{:x}", md5::compute(&blob.bytes));
        let stored = self.blobs.put(&bucket.name, &name, blob.bytes).await?;

        let file = File {
            id: Uuid::new_v4(),
            bucket_id,
            name,
            path,
            size,
            content_type,
            hash: Some(hash),
            storage_path: Some(stored.clone()),
            created_by: actor.user_id,
            updated_by: actor.user_id,
            last_modified: now,
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
        };

        let recorded = match insert_file(&mut tx, &file).await {
            Ok(()) => tx.commit().await.map_err(ServiceError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = recorded {
            self.discard_blob(&stored).await;
            return Err(err);
        }

        info!("uploaded {} ({} bytes) to bucket {}", file.path, file.size, bucket.name);
        Ok(file)
    }

    /// Page through the live files of a bucket, ordered by path. Requires read.
    pub async fn list_files(
        &self,
        actor: &Actor,
        bucket_id: Uuid,
        page: Pagination,
    ) -> ServiceResult<(Vec<File>, i64)> {
        let mut conn = self.db.acquire().await?;
        authorize(&mut conn, actor, bucket_id, AccessLevel::Read).await?;
        fetch_active_bucket(&mut conn, bucket_id).await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM files WHERE bucket_id = ? AND deleted_at IS NULL",
        )
        .bind(bucket_id)
        .fetch_one(&mut *conn)
        .await?;

        let mut files = sqlx::query_as::<_, File>(&format!(
            "SELECT {} FROM files WHERE bucket_id = ? AND deleted_at IS NULL
             ORDER BY path ASC LIMIT ? OFFSET ?",
            FILE_COLUMNS
        ))
        .bind(bucket_id)
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;

        load_metadata(&mut conn, &mut files).await?;
        Ok((files, total))
    }

    /// Fetch one file. `NotFound` if the record does not exist, `Denied` if
    /// it does but the actor has no access to its bucket.
    pub async fn get_file(&self, actor: &Actor, id: Uuid) -> ServiceResult<File> {
        let mut conn = self.db.acquire().await?;
        let file = fetch_active_file(&mut conn, id).await?;
        authorize(&mut conn, actor, file.bucket_id, AccessLevel::Read).await?;

        let mut files = vec![file];
        load_metadata(&mut conn, &mut files).await?;
        files
            .pop()
            .ok_or_else(|| ServiceError::NotFound("file not found".into()))
    }

    /// Apply `patch` to a file. Requires write. A new path must be unique in
    /// the bucket; metadata, when given, replaces the existing pairs.
    pub async fn update_file(&self, actor: &Actor, id: Uuid, patch: FilePatch) -> ServiceResult<File> {
        let mut tx = db::begin_write(&self.db).await?;
        let mut file = fetch_active_file(&mut tx, id).await?;
        authorize(&mut tx, actor, file.bucket_id, AccessLevel::Write).await?;

        if let Some(name) = patch.name {
            ensure_name_valid(&name)?;
            file.name = name;
        }
        if let Some(path) = patch.path {
            if path != file.path {
                ensure_path_safe(&path)?;
                if path_taken(&mut tx, file.bucket_id, &path, Some(file.id)).await? {
                    return Err(path_conflict(&path));
                }
                file.path = path;
            }
        }
        if let Some(content_type) = patch.content_type {
            ensure_content_type_valid(&content_type)?;
            file.content_type = content_type;
        }

        let now = Utc::now();
        file.updated_by = actor.user_id;
        file.updated_at = now;
        file.last_modified = now;

        sqlx::query(
            "UPDATE files SET name = ?, path = ?, content_type = ?, updated_by = ?,
                              last_modified = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&file.name)
        .bind(&file.path)
        .bind(&file.content_type)
        .bind(file.updated_by)
        .bind(file.last_modified)
        .bind(file.updated_at)
        .bind(file.id)
        .execute(&mut *tx)
        .await
        .map_err(|err| conflict_on_unique(err, || path_conflict(&file.path).to_string()))?;

        if let Some(metadata) = patch.metadata {
            ensure_metadata_valid(&metadata)?;
            replace_metadata(&mut tx, file.id, &metadata).await?;
        }

        let mut files = vec![file];
        load_metadata(&mut tx, &mut files).await?;
        tx.commit().await?;

        debug!("updated file {} by {}", id, actor.user_id);
        files
            .pop()
            .ok_or_else(|| ServiceError::NotFound("file not found".into()))
    }

    /// Soft-delete a file and remove its stored content, if any. Requires write.
    pub async fn delete_file(&self, actor: &Actor, id: Uuid) -> ServiceResult<()> {
        let mut tx = db::begin_write(&self.db).await?;
        let file = fetch_active_file(&mut tx, id).await?;
        authorize(&mut tx, actor, file.bucket_id, AccessLevel::Write).await?;

        let now = Utc::now();
        sqlx::query("UPDATE files SET deleted_at = ?, updated_at = ?, updated_by = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(actor.user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM file_metadata WHERE file_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Some(stored) = &file.storage_path {
            self.discard_blob(stored).await;
        }
        info!("deleted file {} ({})", file.path, file.id);
        Ok(())
    }

    /// Issue a one hour URL that stores new content for the file. Requires write.
    pub async fn get_upload_url(&self, actor: &Actor, id: Uuid) -> ServiceResult<SignedUrl> {
        let mut conn = self.db.acquire().await?;
        let file = fetch_active_file(&mut conn, id).await?;
        authorize(&mut conn, actor, file.bucket_id, AccessLevel::Write).await?;

        let expires_at = Utc::now() + Duration::seconds(UPLOAD_URL_TTL_SECS);
        self.signer.sign(SignedOp::Upload, id, actor.user_id, expires_at)
    }

    /// Issue a 24 hour URL that serves the file's content. Requires read.
    pub async fn get_download_url(&self, actor: &Actor, id: Uuid) -> ServiceResult<SignedUrl> {
        let mut conn = self.db.acquire().await?;
        let file = fetch_active_file(&mut conn, id).await?;
        authorize(&mut conn, actor, file.bucket_id, AccessLevel::Read).await?;
        if !file.has_content() {
            return Err(ServiceError::NotFound("file has no stored content".into()));
        }

        let expires_at = Utc::now() + Duration::seconds(DOWNLOAD_URL_TTL_SECS);
        self.signer.sign(SignedOp::Download, id, actor.user_id, expires_at)
    }

    /// Redeem a download URL.
    ///
    /// The user the URL was issued to must still be active and still hold
    /// read access.
    pub async fn read_signed(&self, id: Uuid, params: &SignedParams) -> ServiceResult<(File, Bytes)> {
        self.signer.verify(id, SignedOp::Download, params)?;

        let mut conn = self.db.acquire().await?;
        let actor = signed_actor(&mut conn, params.uid).await?;
        let file = fetch_active_file(&mut conn, id).await?;
        authorize(&mut conn, &actor, file.bucket_id, AccessLevel::Read).await?;
        drop(conn);

        let stored = file
            .storage_path
            .as_deref()
            .ok_or_else(|| ServiceError::NotFound("file has no stored content".into()))?;
        let bytes = self.blobs.get(stored).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ServiceError::NotFound("file content missing".into())
            } else {
                ServiceError::from(err)
            }
        })?;

        debug!("served {} bytes of file {} to {}", bytes.len(), id, actor.user_id);
        Ok((file, bytes))
    }

    /// Redeem an upload URL, replacing the file's content with `bytes`.
    ///
    /// The previous content is removed once the new content is recorded.
    pub async fn write_signed(
        &self,
        id: Uuid,
        params: &SignedParams,
        content_type: Option<String>,
        bytes: Bytes,
    ) -> ServiceResult<File> {
        self.signer.verify(id, SignedOp::Upload, params)?;
        if let Some(content_type) = &content_type {
            ensure_content_type_valid(content_type)?;
        }

        let mut tx = db::begin_write(&self.db).await?;
        let actor = signed_actor(&mut tx, params.uid).await?;
        let mut file = fetch_active_file(&mut tx, id).await?;
        authorize(&mut tx, &actor, file.bucket_id, AccessLevel::Write).await?;
        let bucket = fetch_active_bucket(&mut tx, file.bucket_id).await?;

        let now = Utc::now();
        let previous = file.storage_path.take();
        file.size = bytes.len() as i64;
        file.hash = Some(format!("{:x}", md5::compute(&bytes)));
        if let Some(content_type) = content_type.filter(|ct| !ct.is_empty()) {
            file.content_type = content_type;
        }
        file.updated_by = actor.user_id;
        file.updated_at = now;
        file.last_modified = now;

        let stored = self.blobs.put(&bucket.name, &file.name, bytes).await?;
        file.storage_path = Some(stored.clone());

        let recorded = record_content(tx, file).await;
        let file = match recorded {
            Ok(file) => file,
            Err(err) => {
                self.discard_blob(&stored).await;
                return Err(err);
            }
        };

        if let Some(previous) = previous {
            self.discard_blob(&previous).await;
        }
        info!("stored {} bytes for file {} via signed url", file.size, file.id);
        Ok(file)
    }

    /// Best-effort blob removal. Failures are logged, never returned.
    async fn discard_blob(&self, stored: &str) {
        if let Err(err) = self.blobs.delete(stored).await {
            warn!("failed to remove blob {}: {}", stored, err);
        }
    }
}

/// Paths are absolute within the bucket and may not traverse.
pub fn ensure_path_safe(path: &str) -> ServiceResult<()> {
    if !path.starts_with('/') {
        return Err(ServiceError::InvalidInput(format!(
            "invalid path `{}`: must start with `/`",
            path
        )));
    }
    if path.contains("..") {
        return Err(ServiceError::InvalidInput(format!(
            "invalid path `{}`: must not contain `..`",
            path
        )));
    }
    if path.len() > MAX_FILE_PATH_LEN {
        return Err(ServiceError::InvalidInput(
            "invalid path: must be at most 1024 characters".into(),
        ));
    }
    if path.chars().any(|c| c.is_control()) {
        return Err(ServiceError::InvalidInput(
            "invalid path: must not contain control characters".into(),
        ));
    }
    Ok(())
}

fn ensure_name_valid(name: &str) -> ServiceResult<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_FILE_NAME_LEN {
        return Err(ServiceError::InvalidInput(
            "file name must be between 1 and 255 characters".into(),
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ServiceError::InvalidInput(
            "file name must not contain control characters".into(),
        ));
    }
    Ok(())
}

fn ensure_content_type_valid(content_type: &str) -> ServiceResult<()> {
    if content_type.is_empty() || content_type.len() > MAX_CONTENT_TYPE_LEN {
        return Err(ServiceError::InvalidInput(
            "content type must be between 1 and 100 characters".into(),
        ));
    }
    Ok(())
}

fn ensure_metadata_valid(metadata: &HashMap<String, String>) -> ServiceResult<()> {
    for (key, value) in metadata {
        if key.is_empty() || key.chars().count() > METADATA_KEY_MAX_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "metadata key `{}` must be between 1 and {} characters",
                key, METADATA_KEY_MAX_LEN
            )));
        }
        if value.chars().count() > METADATA_VALUE_MAX_LEN {
            return Err(ServiceError::InvalidInput(format!(
                "metadata value for `{}` must be at most {} characters",
                key, METADATA_VALUE_MAX_LEN
            )));
        }
    }
    Ok(())
}

fn path_conflict(path: &str) -> ServiceError {
    ServiceError::Conflict(format!("path `{}` already exists in bucket", path))
}

async fn fetch_active_file(conn: &mut SqliteConnection, id: Uuid) -> ServiceResult<File> {
    sqlx::query_as::<_, File>(&format!(
        "SELECT {} FROM files WHERE id = ? AND deleted_at IS NULL",
        FILE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ServiceError::NotFound("file not found".into()))
}

/// Resolve the user a signed URL was issued to.
async fn signed_actor(conn: &mut SqliteConnection, user_id: Uuid) -> ServiceResult<Actor> {
    active_actor(conn, user_id)
        .await?
        .ok_or_else(|| ServiceError::Unauthenticated("signed url is no longer valid".into()))
}

async fn path_taken(
    conn: &mut SqliteConnection,
    bucket_id: Uuid,
    path: &str,
    except: Option<Uuid>,
) -> ServiceResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM files
                       WHERE bucket_id = ? AND path = ? AND deleted_at IS NULL AND id IS NOT ?)",
    )
    .bind(bucket_id)
    .bind(path)
    .bind(except)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

async fn insert_file(conn: &mut SqliteConnection, file: &File) -> ServiceResult<()> {
    sqlx::query(
        "INSERT INTO files (id, bucket_id, name, path, size, content_type, hash, storage_path,
                            created_by, updated_by, last_modified, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(file.id)
    .bind(file.bucket_id)
    .bind(&file.name)
    .bind(&file.path)
    .bind(file.size)
    .bind(&file.content_type)
    .bind(&file.hash)
    .bind(&file.storage_path)
    .bind(file.created_by)
    .bind(file.updated_by)
    .bind(file.last_modified)
    .bind(file.created_at)
    .bind(file.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(|err| conflict_on_unique(err, || path_conflict(&file.path).to_string()))?;

    replace_metadata(conn, file.id, &file.metadata).await
}

/// Persist new content fields for `file` and commit.
async fn record_content(mut tx: Transaction<'_, Sqlite>, file: File) -> ServiceResult<File> {
    sqlx::query(
        "UPDATE files SET size = ?, hash = ?, storage_path = ?, content_type = ?,
                          updated_by = ?, last_modified = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(file.size)
    .bind(&file.hash)
    .bind(&file.storage_path)
    .bind(&file.content_type)
    .bind(file.updated_by)
    .bind(file.last_modified)
    .bind(file.updated_at)
    .bind(file.id)
    .execute(&mut *tx)
    .await?;

    let mut files = vec![file];
    load_metadata(&mut tx, &mut files).await?;
    tx.commit().await?;
    files
        .pop()
        .ok_or_else(|| ServiceError::NotFound("file not found".into()))
}

async fn replace_metadata(
    conn: &mut SqliteConnection,
    file_id: Uuid,
    metadata: &HashMap<String, String>,
) -> ServiceResult<()> {
    sqlx::query("DELETE FROM file_metadata WHERE file_id = ?")
        .bind(file_id)
        .execute(&mut *conn)
        .await?;
    if metadata.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO file_metadata (file_id, key, value) ");
    builder.push_values(metadata, |mut row, (key, value)| {
        row.push_bind(file_id).push_bind(key).push_bind(value);
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Attach the stored metadata pairs to each file.
async fn load_metadata(conn: &mut SqliteConnection, files: &mut [File]) -> ServiceResult<()> {
    if files.is_empty() {
        return Ok(());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(
        "SELECT file_id, key, value FROM file_metadata WHERE file_id IN (",
    );
    let mut ids = builder.separated(", ");
    for file in files.iter() {
        ids.push_bind(file.id);
    }
    ids.push_unseparated(")");

    let rows: Vec<FileMetadata> = builder.build_query_as().fetch_all(&mut *conn).await?;
    for row in rows {
        if let Some(file) = files.iter_mut().find(|file| file.id == row.file_id) {
            file.metadata.insert(row.key, row.value);
        }
    }
    Ok(())
}
