//! Upload of a finished archive and creation of its catalog entry.

use crate::{
    models::{
        access::AccessGrant,
        archive::{ArchiveEntry, NewArchiveEntry},
    },
    services::{
        archive_builder::ArchiveError,
        backends::{ArchiveCatalog, BlobStore},
        storage_service::StorageError,
    },
};
use bytes::Bytes;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const MAX_BASE_NAME_LEN: usize = 64;
const FALLBACK_BASE_NAME: &str = "event";

/// Why a whole chunk could not be delivered.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("archive upload failed: {0}")]
    Upload(#[source] StorageError),
    #[error("catalog write failed: {0}")]
    Catalog(#[source] StorageError),
}

/// A finished chunk ready to be uploaded and recorded.
pub struct ChunkUpload<'a> {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub photo_count: usize,
    pub ordinal: usize,
    pub total_chunks: usize,
    pub owner_id: &'a str,
    pub event_id: &'a str,
}

/// Upload the archive bytes, then record a catalog entry for them.
///
/// Both the blob and the entry are granted to the owner only. If the catalog
/// write fails the uploaded blob is deleted again; when that delete also
/// fails the blob is left behind and logged.
pub async fn upload_and_record(
    blobs: &dyn BlobStore,
    catalog: &dyn ArchiveCatalog,
    bucket: &str,
    chunk: ChunkUpload<'_>,
) -> Result<ArchiveEntry, GroupError> {
    let grant = AccessGrant::owner(chunk.owner_id);
    let blob_id = archive_blob_id(chunk.event_id, chunk.ordinal);
    let size_bytes = chunk.bytes.len() as i64;

    // The buffer moves into the upload and is released when it returns.
    let file_id = blobs
        .upload_blob(
            bucket,
            &blob_id,
            &chunk.filename,
            Bytes::from(chunk.bytes),
            &grant,
        )
        .await
        .map_err(GroupError::Upload)?;

    let entry = NewArchiveEntry {
        event_id: chunk.event_id.to_string(),
        owner_id: chunk.owner_id.to_string(),
        file_id: file_id.clone(),
        filename: chunk.filename,
        size_bytes,
        photo_count: chunk.photo_count as i64,
        chunk_index: chunk.ordinal as i64,
        total_chunks: chunk.total_chunks as i64,
    };

    match catalog.create_archive_entry(entry, &grant).await {
        Ok(recorded) => {
            info!(
                event_id = %chunk.event_id,
                chunk = chunk.ordinal,
                archive_id = %recorded.id,
                file_id = %recorded.file_id,
                size_bytes,
                "archive recorded"
            );
            Ok(recorded)
        }
        Err(err) => {
            if let Err(cleanup) = blobs.delete_blob(bucket, &file_id).await {
                warn!(
                    file_id = %file_id,
                    "could not remove unrecorded archive blob: {}",
                    cleanup
                );
            }
            Err(GroupError::Catalog(err))
        }
    }
}

/// Blob id for an archive: scoped to the event and chunk, with a random
/// suffix so reruns never collide.
pub fn archive_blob_id(event_id: &str, ordinal: usize) -> String {
    format!(
        "archive-{}-{}-{}",
        sanitize_base_name(event_id),
        ordinal,
        Uuid::new_v4().simple()
    )
}

/// Download filename for a chunk. A single-chunk run gets the plain base
/// name; multi-chunk runs are suffixed with the ordinal.
pub fn archive_filename(event_name: &str, ordinal: usize, total_chunks: usize) -> String {
    let base = sanitize_base_name(event_name);
    if total_chunks > 1 {
        format!("{}_part{}.zip", base, ordinal)
    } else {
        format!("{}.zip", base)
    }
}

/// Restrict a display name to `[A-Za-z0-9_-]`, collapsing every other run
/// of characters into one `_` and capping the length.
pub fn sanitize_base_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len().min(MAX_BASE_NAME_LEN));
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed: String = out
        .trim_matches('_')
        .chars()
        .take(MAX_BASE_NAME_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches('_');
    if trimmed.is_empty() {
        FALLBACK_BASE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryBlobs, MemoryCatalog};
    use std::collections::HashSet;

    fn chunk<'a>(ordinal: usize, total: usize) -> ChunkUpload<'a> {
        ChunkUpload {
            bytes: b"PK-bytes".to_vec(),
            filename: archive_filename("Summer Party", ordinal, total),
            photo_count: 3,
            ordinal,
            total_chunks: total,
            owner_id: "u-1",
            event_id: "ev-1",
        }
    }

    #[test]
    fn single_chunk_filename_has_no_suffix() {
        assert_eq!(archive_filename("Summer Party", 1, 1), "Summer_Party.zip");
    }

    #[test]
    fn multi_chunk_filenames_are_distinct() {
        let names: HashSet<_> = (1..=4).map(|i| archive_filename("Party", i, 4)).collect();
        assert_eq!(names.len(), 4);
        assert!(names.contains("Party_part1.zip"));
        assert!(names.contains("Party_part4.zip"));
    }

    #[test]
    fn base_names_are_sanitized_and_capped() {
        assert_eq!(sanitize_base_name("  Ana & João's 30th!!  "), "Ana_Jo_o_s_30th");
        assert_eq!(sanitize_base_name("../../etc"), "etc");
        assert_eq!(sanitize_base_name("***"), "event");
        assert_eq!(sanitize_base_name(""), "event");
        assert_eq!(sanitize_base_name(&"x".repeat(200)).len(), MAX_BASE_NAME_LEN);
    }

    #[test]
    fn blob_ids_are_scoped_and_unique() {
        let a = archive_blob_id("ev/1", 2);
        let b = archive_blob_id("ev/1", 2);
        assert!(a.starts_with("archive-ev_1-2-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn uploads_then_records_with_owner_grant() {
        let blobs = MemoryBlobs::new();
        let catalog = MemoryCatalog::new();

        let entry = upload_and_record(&blobs, &catalog, "archives", chunk(2, 3))
            .await
            .expect("record");

        assert_eq!(entry.filename, "Summer_Party_part2.zip");
        assert_eq!(entry.chunk_index, 2);
        assert_eq!(entry.total_chunks, 3);
        assert_eq!(entry.photo_count, 3);
        assert_eq!(entry.size_bytes, 8);
        assert!(AccessGrant::allows(&entry.permissions, "read", "u-1"));

        let stored = blobs.get("archives", &entry.file_id).expect("uploaded blob");
        assert_eq!(stored, b"PK-bytes".to_vec());
        assert_eq!(blobs.grant_for("archives", &entry.file_id), Some(AccessGrant::owner("u-1")));
    }

    #[tokio::test]
    async fn upload_failure_skips_catalog_write() {
        let blobs = MemoryBlobs::new();
        blobs.fail_uploads();
        let catalog = MemoryCatalog::new();

        let err = upload_and_record(&blobs, &catalog, "archives", chunk(1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, GroupError::Upload(_)));
        assert!(catalog.entries().is_empty());
    }

    #[tokio::test]
    async fn catalog_failure_removes_uploaded_blob() {
        let blobs = MemoryBlobs::new();
        let catalog = MemoryCatalog::new();
        catalog.fail_writes();

        let err = upload_and_record(&blobs, &catalog, "archives", chunk(1, 1))
            .await
            .unwrap_err();

        assert!(matches!(err, GroupError::Catalog(_)));
        assert_eq!(blobs.count("archives"), 0);
        assert_eq!(blobs.deleted().len(), 1);
    }
}
