//! Represents a catalog entry describing one uploaded archive chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const STATUS_COMPLETED: &str = "completed";

/// A persisted catalog entry for one archive.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub id: String,

    pub event_id: String,

    /// User the archive belongs to (the event owner at creation time).
    pub owner_id: String,

    /// Id of the archive payload in the archive bucket.
    pub file_id: String,

    pub filename: String,

    /// Realized archive size in bytes.
    pub size_bytes: i64,

    /// Number of photos written into the archive.
    pub photo_count: i64,

    /// 1-based position among the chunks of one run.
    pub chunk_index: i64,

    pub total_chunks: i64,

    pub status: String,

    /// JSON array of permission strings, see `AccessGrant`.
    #[serde(default, skip_serializing)]
    pub permissions: String,

    pub created_at: DateTime<Utc>,
}

/// Fields supplied when recording a freshly uploaded archive.
#[derive(Clone, Debug)]
pub struct NewArchiveEntry {
    pub event_id: String,
    pub owner_id: String,
    pub file_id: String,
    pub filename: String,
    pub size_bytes: i64,
    pub photo_count: i64,
    pub chunk_index: i64,
    pub total_chunks: i64,
}
