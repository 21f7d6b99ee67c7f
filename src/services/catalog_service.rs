//! src/services/catalog_service.rs
//!
//! CatalogService: the document store side of the archiver. Reads events
//! and pages through their photos, and records one archive row per uploaded
//! chunk. Everything is backed by SQLite.

use crate::{
    models::{
        access::AccessGrant,
        archive::{ArchiveEntry, NewArchiveEntry, STATUS_COMPLETED},
        event::Event,
        photo::Photo,
    },
    services::{
        backends::{ArchiveCatalog, EventDirectory},
        storage_service::{StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const ARCHIVE_COLUMNS: &str = "id, event_id, owner_id, file_id, filename, size_bytes, \
     photo_count, chunk_index, total_chunks, status, permissions, created_at";

#[derive(Clone)]
pub struct CatalogService {
    pub db: Arc<SqlitePool>,
}

impl CatalogService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Fetch an event, returning EventNotFound if missing.
    pub async fn fetch_event(&self, event_id: &str) -> StorageResult<Event> {
        sqlx::query_as::<_, Event>(
            "SELECT id, name, owner_id, created_at FROM events WHERE id = ?",
        )
        .bind(event_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::EventNotFound(event_id.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    /// Page through an event's photos ordered by `(created_at, id)`, so that
    /// repeated listings of unchanged data produce the same sequence.
    pub async fn fetch_photos_page(
        &self,
        event_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Photo>> {
        let rows = sqlx::query_as::<_, Photo>(
            "SELECT id, event_id, file_id, size_mb, file_type, created_at
             FROM photos
             WHERE event_id = ?
             ORDER BY created_at ASC, id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(event_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Insert a catalog row for an uploaded archive.
    pub async fn insert_archive(
        &self,
        entry: NewArchiveEntry,
        grant: &AccessGrant,
    ) -> StorageResult<ArchiveEntry> {
        let permissions = grant.to_json()?;
        let sql = format!(
            "INSERT INTO archives ({ARCHIVE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {ARCHIVE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ArchiveEntry>(&sql)
            .bind(Uuid::new_v4().to_string())
            .bind(&entry.event_id)
            .bind(&entry.owner_id)
            .bind(&entry.file_id)
            .bind(&entry.filename)
            .bind(entry.size_bytes)
            .bind(entry.photo_count)
            .bind(entry.chunk_index)
            .bind(entry.total_chunks)
            .bind(STATUS_COMPLETED)
            .bind(&permissions)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await?;
        Ok(row)
    }

    /// All archives recorded for an event, oldest first, in chunk order.
    pub async fn list_archives(&self, event_id: &str) -> StorageResult<Vec<ArchiveEntry>> {
        let sql = format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives
             WHERE event_id = ?
             ORDER BY created_at ASC, chunk_index ASC"
        );
        let rows = sqlx::query_as::<_, ArchiveEntry>(&sql)
            .bind(event_id)
            .fetch_all(&*self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get_archive(&self, archive_id: &str) -> StorageResult<ArchiveEntry> {
        let sql = format!("SELECT {ARCHIVE_COLUMNS} FROM archives WHERE id = ?");
        sqlx::query_as::<_, ArchiveEntry>(&sql)
            .bind(archive_id)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StorageError::ArchiveNotFound(archive_id.to_string()),
                other => StorageError::Sqlx(other),
            })
    }
}

#[async_trait]
impl EventDirectory for CatalogService {
    async fn get_event(&self, event_id: &str) -> StorageResult<Event> {
        self.fetch_event(event_id).await
    }

    async fn list_photos_page(
        &self,
        event_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Photo>> {
        self.fetch_photos_page(event_id, offset, limit).await
    }
}

#[async_trait]
impl ArchiveCatalog for CatalogService {
    async fn create_archive_entry(
        &self,
        entry: NewArchiveEntry,
        grant: &AccessGrant,
    ) -> StorageResult<ArchiveEntry> {
        self.insert_archive(entry, grant).await
    }
}

/// Seeding helpers for tests; events and photos are written by other services
/// in a deployment.
#[cfg(test)]
impl CatalogService {
    pub async fn insert_event(&self, id: &str, name: &str, owner_id: &str) -> StorageResult<Event> {
        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)
             RETURNING id, name, owner_id, created_at",
        )
        .bind(id)
        .bind(name)
        .bind(owner_id)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(event)
    }

    pub async fn insert_photo(&self, photo: &Photo) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO photos (id, event_id, file_id, size_mb, file_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&photo.id)
        .bind(&photo.event_id)
        .bind(&photo.file_id)
        .bind(photo.size_mb)
        .bind(&photo.file_type)
        .bind(photo.created_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }
}
