//! src/services/storage_service.rs
//!
//! StorageService: the blob store. Payload bytes live on local disk sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{id}`; metadata (size, etag,
//! access grant) lives in the SQLite `blobs` table. Photos are read from it
//! and finished archives are written back into it.

use crate::{
    models::{access::AccessGrant, blob::Blob},
    services::backends::BlobStore,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Errors raised by the blob store and the catalog.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event `{0}` not found")]
    EventNotFound(String),
    #[error("archive `{0}` not found")]
    ArchiveNotFound(String),
    #[error("blob `{id}` not found in bucket `{bucket}`")]
    BlobNotFound { bucket: String, id: String },
    #[error("blob `{id}` already exists in bucket `{bucket}`")]
    BlobAlreadyExists { bucket: String, id: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid blob id")]
    InvalidBlobId,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the blob operations the archive pipeline needs:
/// - Read a blob (metadata from SQLite, payload from disk)
/// - Write a blob (temp file, fsync, metadata insert, then rename)
/// - Delete a blob (metadata row and payload, pruning empty shard dirs)
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for blob metadata.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where payloads are stored.
    pub base_path: PathBuf,
}

const MAX_BLOB_ID_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

impl StorageService {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Reject ids that could escape the bucket directory.
    fn ensure_id_safe(&self, id: &str) -> StorageResult<()> {
        if id.is_empty() || id.len() > MAX_BLOB_ID_LEN {
            return Err(StorageError::InvalidBlobId);
        }
        if id.starts_with('/') || id.contains("..") {
            return Err(StorageError::InvalidBlobId);
        }
        if id
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidBlobId);
        }
        Ok(())
    }

    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        validate_bucket_name(name)
    }

    fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    /// Two-level shard directories from MD5(bucket/id), as lowercase hex.
    fn blob_shards(bucket: &str, id: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, id));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, bucket: &str, id: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::blob_shards(bucket, id);
        let mut path = self.bucket_root(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(id);
        path
    }

    /// Fetch blob metadata, returning BlobNotFound if the row is missing.
    pub async fn get_blob_metadata(&self, bucket: &str, id: &str) -> StorageResult<Blob> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_id_safe(id)?;
        sqlx::query_as::<_, Blob>(
            "SELECT bucket, id, filename, content_type, size_bytes, etag, permissions, created_at
             FROM blobs WHERE bucket = ? AND id = ?",
        )
        .bind(bucket)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BlobNotFound {
                bucket: bucket.to_string(),
                id: id.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Write a blob and record its metadata.
    ///
    /// The payload goes to a temp file beside its final location and is
    /// synced. The metadata row is inserted next, and only then is the temp
    /// file renamed into place, so a writer that loses the race for an id
    /// never touches the winner's payload.
    pub async fn put_blob(
        &self,
        bucket: &str,
        id: &str,
        filename: &str,
        content_type: Option<&str>,
        data: Bytes,
        grant: &AccessGrant,
    ) -> StorageResult<Blob> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_id_safe(id)?;
        let permissions = grant.to_json()?;

        match self.get_blob_metadata(bucket, id).await {
            Ok(_) => {
                return Err(StorageError::BlobAlreadyExists {
                    bucket: bucket.to_string(),
                    id: id.to_string(),
                });
            }
            Err(StorageError::BlobNotFound { .. }) => {}
            Err(err) => return Err(err),
        }

        let file_path = self.blob_path(bucket, id);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, &data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let mut digest = Context::new();
        digest.consume(&data);
        let etag = format!("{:x}", digest.compute());

        // The row claims the id; only its winner may move a payload into place.
        let insert_result = sqlx::query_as::<_, Blob>(
            r#"
            INSERT INTO blobs (
                bucket, id, filename, content_type, size_bytes, etag, permissions, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING bucket, id, filename, content_type, size_bytes, etag, permissions, created_at
            "#,
        )
        .bind(bucket)
        .bind(id)
        .bind(filename)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(&permissions)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        let blob = match insert_result {
            Ok(blob) => blob,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                if is_unique_violation(&err) {
                    return Err(StorageError::BlobAlreadyExists {
                        bucket: bucket.to_string(),
                        id: id.to_string(),
                    });
                }
                return Err(StorageError::Sqlx(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = sqlx::query("DELETE FROM blobs WHERE bucket = ? AND id = ?")
                .bind(bucket)
                .bind(id)
                .execute(&*self.db)
                .await;
            return Err(StorageError::Io(err));
        }

        Ok(blob)
    }

    /// Read a whole blob into memory.
    pub async fn read_blob(&self, bucket: &str, id: &str) -> StorageResult<Bytes> {
        self.get_blob_metadata(bucket, id).await?;
        let file_path = self.blob_path(bucket, id);
        match fs::read(&file_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::BlobNotFound {
                bucket: bucket.to_string(),
                id: id.to_string(),
            }),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Open a blob for streaming out. Returns BlobNotFound if the metadata
    /// exists but the payload file is gone.
    pub async fn get_blob_reader(&self, bucket: &str, id: &str) -> StorageResult<(Blob, File)> {
        let blob = self.get_blob_metadata(bucket, id).await?;
        let file_path = self.blob_path(bucket, id);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::BlobNotFound {
                    bucket: bucket.to_string(),
                    id: id.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((blob, file))
    }

    /// Remove a blob's metadata row and payload, then prune empty shard
    /// directories. A payload that is already missing is not an error.
    pub async fn remove_blob(&self, bucket: &str, id: &str) -> StorageResult<()> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_id_safe(id)?;

        let result = sqlx::query("DELETE FROM blobs WHERE bucket = ? AND id = ?")
            .bind(bucket)
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::BlobNotFound {
                bucket: bucket.to_string(),
                id: id.to_string(),
            });
        }

        let file_path = self.blob_path(bucket, id);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed blob payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(())
    }

    /// Walk up from `start` removing empty directories, stopping at `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn fetch_blob(&self, bucket: &str, file_id: &str) -> StorageResult<Bytes> {
        self.read_blob(bucket, file_id).await
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        blob_id: &str,
        filename: &str,
        data: Bytes,
        grant: &AccessGrant,
    ) -> StorageResult<String> {
        let blob = self
            .put_blob(
                bucket,
                blob_id,
                filename,
                Some(ARCHIVE_CONTENT_TYPE),
                data,
                grant,
            )
            .await?;
        Ok(blob.id)
    }

    async fn delete_blob(&self, bucket: &str, blob_id: &str) -> StorageResult<()> {
        self.remove_blob(bucket, blob_id).await
    }
}

/// Bucket names come from configuration: 3–63 chars of lowercase letters,
/// digits, and hyphens, not starting or ending with a hyphen.
pub fn validate_bucket_name(name: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.into(),
    };

    if name.len() < BUCKET_NAME_MIN_LEN || name.len() > BUCKET_NAME_MAX_LEN {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, and hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    Ok(())
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Return true if the SQLx error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}
