//! Metadata for a payload held in the blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored blob. The struct carries metadata only; bytes live on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    /// Bucket (namespace) the blob was written to, e.g. `photos` or `archives`.
    pub bucket: String,

    /// Blob id, unique within its bucket.
    pub id: String,

    /// Download filename.
    pub filename: String,

    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub etag: String,

    /// JSON array of permission strings, see `AccessGrant`.
    pub permissions: String,

    pub created_at: DateTime<Utc>,
}
