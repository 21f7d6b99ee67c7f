//! Collaborator seams consumed by the archive pipeline.
//!
//! The pipeline only talks to these traits. `CatalogService` and
//! `StorageService` implement them against SQLite and local disk; tests
//! swap in in-memory fakes.

use crate::{
    models::{
        access::AccessGrant,
        archive::{ArchiveEntry, NewArchiveEntry},
        event::Event,
        photo::Photo,
    },
    services::storage_service::StorageResult,
};
use async_trait::async_trait;
use bytes::Bytes;

/// Read access to events and their photos.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Look up an event (and with it, its owner).
    async fn get_event(&self, event_id: &str) -> StorageResult<Event>;

    /// One page of an event's photos in a stable order. A page shorter than
    /// `limit` is the last one.
    async fn list_photos_page(
        &self,
        event_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Photo>>;
}

/// Blob download and upload.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch_blob(&self, bucket: &str, file_id: &str) -> StorageResult<Bytes>;

    /// Store `data` as a new blob and return its remote id.
    async fn upload_blob(
        &self,
        bucket: &str,
        blob_id: &str,
        filename: &str,
        data: Bytes,
        grant: &AccessGrant,
    ) -> StorageResult<String>;

    async fn delete_blob(&self, bucket: &str, blob_id: &str) -> StorageResult<()>;
}

/// Write side of the archive catalog.
#[async_trait]
pub trait ArchiveCatalog: Send + Sync {
    async fn create_archive_entry(
        &self,
        entry: NewArchiveEntry,
        grant: &AccessGrant,
    ) -> StorageResult<ArchiveEntry>;
}
