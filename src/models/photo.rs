//! Represents a photo record: metadata for one source blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single photo belonging to an event.
///
/// The record carries metadata only; the bytes live in the blob store under
/// `file_id`. Records are read-only to the archive pipeline.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    pub id: String,

    /// Owning event.
    pub event_id: String,

    /// Reference to the payload in the photo bucket.
    pub file_id: String,

    /// Declared size in megabytes. `None` means unknown and counts as zero.
    pub size_mb: Option<f64>,

    /// MIME type (`image/jpeg`) or original filename (`IMG_0001.HEIC`).
    pub file_type: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Photo {
    /// Declared size used for chunking. Missing, negative, and non-finite
    /// sizes are treated as zero.
    pub fn declared_size_mb(&self) -> f64 {
        match self.size_mb {
            Some(size) if size.is_finite() && size > 0.0 => size,
            _ => 0.0,
        }
    }
}
