//! Represents a file stored in a bucket.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata record for a single file within a bucket.
///
/// The struct describes the file; its content (if any was uploaded) lives in
/// the blob store under `storage_path`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct File {
    /// Unique identifier for this file.
    pub id: Uuid,

    /// Parent bucket.
    pub bucket_id: Uuid,

    /// Display name, usually the original filename.
    pub name: String,

    /// Logical path, unique among the bucket's non-deleted files.
    pub path: String,

    /// Size in bytes.
    pub size: i64,

    /// MIME type.
    pub content_type: String,

    /// MD5 hex digest of the stored content, when content was uploaded.
    pub hash: Option<String>,

    /// Location of the content in the blob store. `None` for metadata-only
    /// records.
    #[serde(skip)]
    pub storage_path: Option<String>,

    /// User that created the record.
    pub created_by: Uuid,

    /// User that last changed the record.
    pub updated_by: Uuid,

    /// When the content was last written.
    pub last_modified: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// User-defined key/value pairs, loaded from `file_metadata`.
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl File {
    pub fn has_content(&self) -> bool {
        self.storage_path.is_some()
    }
}

/// Input for a metadata-only file record.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFileRecord {
    pub bucket_id: Uuid,
    pub name: String,
    pub path: String,
    pub content_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Partial update of a file record. `None` fields are left untouched;
/// `Some(metadata)` replaces the whole metadata map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

/// Content received from a client upload.
#[derive(Debug, Clone)]
pub struct UploadedBlob {
    /// Filename suggested by the client.
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A time-bounded reference to a file's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
