//! src/services/blob_store.rs
//!
//! Blob storage for file content. Services only see the `BlobStore` trait:
//! content goes in under a namespace (the bucket name) and a suggested
//! filename, and comes back out by the stored path the store returned.
//!
//! `LocalBlobStore` keeps blobs on disk beneath `base_path/{namespace}/{name}`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_SEGMENT_LEN: usize = 255;
const MAX_NAME_ATTEMPTS: usize = 4;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return the path it was stored under. The final
    /// name is derived from `suggested_name` but never equal to an existing
    /// blob's name.
    async fn put(&self, namespace: &str, suggested_name: &str, bytes: Bytes) -> io::Result<String>;

    async fn get(&self, stored_path: &str) -> io::Result<Bytes>;

    /// Remove a blob. Deleting a missing blob is not an error.
    async fn delete(&self, stored_path: &str) -> io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Base directory on disk where blobs are stored.
    pub base_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Map a stored path back onto the filesystem, rejecting anything that
    /// could escape `base_path`.
    fn resolve(&self, stored_path: &str) -> io::Result<PathBuf> {
        let (namespace, name) = stored_path
            .split_once('/')
            .ok_or_else(|| invalid(format!("malformed blob path `{}`", stored_path)))?;
        ensure_segment_safe(namespace)?;
        ensure_segment_safe(name)?;
        Ok(self.base_path.join(namespace).join(name))
    }

    /// Remove the namespace directory once its last blob is gone.
    async fn prune_empty_namespace(&self, dir: &Path) {
        match fs::remove_dir(dir).await {
            Ok(_) => debug!("removed empty namespace {}", dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {}
            Err(err) => debug!("failed to prune directory {}: {}", dir.display(), err),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    /// Writes to a temporary file, fsyncs, then renames into place so a
    /// reader never observes a partial blob.
    async fn put(&self, namespace: &str, suggested_name: &str, bytes: Bytes) -> io::Result<String> {
        ensure_segment_safe(namespace)?;
        let dir = self.base_path.join(namespace);
        fs::create_dir_all(&dir).await?;

        let mut name = unique_blob_name(suggested_name);
        let mut attempts = 1;
        while fs::try_exists(dir.join(&name)).await? {
            if attempts == MAX_NAME_ATTEMPTS {
                return Err(io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("could not find a free name for `{}`", suggested_name),
                ));
            }
            name = unique_blob_name(suggested_name);
            attempts += 1;
        }
        ensure_segment_safe(&name)?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let final_path = dir.join(&name);

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &final_path).await
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        debug!("stored blob {} ({} bytes)", final_path.display(), bytes.len());
        Ok(format!("{}/{}", namespace, name))
    }

    async fn get(&self, stored_path: &str) -> io::Result<Bytes> {
        let path = self.resolve(stored_path)?;
        Ok(Bytes::from(fs::read(&path).await?))
    }

    async fn delete(&self, stored_path: &str) -> io::Result<()> {
        let path = self.resolve(stored_path)?;
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed blob {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
            }
            Err(err) => return Err(err),
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_namespace(parent).await;
        }
        Ok(())
    }
}

/// Build a collision-resistant name: `<stem>_<YYYYmmddHHMMSS>_<8 hex><.ext>`.
///
/// The random suffix keeps same-second uploads of the same basename apart.
pub fn unique_blob_name(suggested_name: &str) -> String {
    let base = Path::new(suggested_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("blob");
    let base = base.trim_start_matches('.');
    let path = Path::new(base);

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or("blob");
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let stem: String = stem
        .chars()
        .map(|c| if c.is_control() || c == '\\' { '_' } else { c })
        .take(MAX_SEGMENT_LEN - 40)
        .collect();

    format!(
        "{}_{}_{:08x}{}",
        stem,
        Utc::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>(),
        ext
    )
}

/// Reject path segments that are empty, hidden, or could traverse.
fn ensure_segment_safe(segment: &str) -> io::Result<()> {
    if segment.is_empty() || segment.len() > MAX_SEGMENT_LEN {
        return Err(invalid(format!("invalid blob path segment `{}`", segment)));
    }
    if segment.starts_with('.') || segment.contains(['/', '\\']) {
        return Err(invalid(format!("invalid blob path segment `{}`", segment)));
    }
    if segment.chars().any(|c| c.is_control()) {
        return Err(invalid(format!("invalid blob path segment `{}`", segment)));
    }
    Ok(())
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(ErrorKind::InvalidInput, msg)
}
